//! Command-line interface definitions for mediavault.
//!
//! Global options (verbosity, colour, config file, timeout) apply to every
//! subcommand. Archive and target paths fall back to the config file.
//!
//! # Example
//!
//! ```bash
//! # Bring the archive index up to date
//! mediavault reconcile --archive ~/Pictures/Archive
//!
//! # Which files on the card are not archived yet?
//! mediavault detect /media/sdcard/DCIM --output json
//!
//! # Copy them in, then mirror the archive to two drives
//! mediavault backup /media/sdcard/DCIM --into 2024-summer
//! mediavault sync --target /mnt/usb1 --target /mnt/usb2
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Multimedia backup tool: index an archive, find what is new, mirror it.
#[derive(Debug, Parser)]
#[command(name = "mediavault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Plain progress output for screen readers
    #[arg(long, global = true)]
    pub accessible: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Cancel the operation after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the multimedia files under one or more roots
    Collect(CollectArgs),
    /// Hash files and print their content identities
    Hash(HashArgs),
    /// Bring the archive index up to date with the files on disk
    Reconcile(StoreArgs),
    /// Rebuild the archive index by hashing every file again
    Rehash(StoreArgs),
    /// Classify source files against the archive
    Detect(DetectArgs),
    /// Mirror the archive into one or more targets
    Sync(SyncArgs),
    /// Copy new source files into the archive
    Backup(BackupArgs),
    /// Write a configuration file
    Init(InitArgs),
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Arguments for `collect`.
#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Directories to search
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Only look at the top level of each root
    #[arg(long)]
    pub no_recurse: bool,
}

/// Arguments for `hash`.
#[derive(Debug, Args)]
pub struct HashArgs {
    /// Files, or directories whose media files are hashed
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Number of hashing threads (default: all cores)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Only look at the top level of directories
    #[arg(long)]
    pub no_recurse: bool,

    /// Files up to this size are hashed in full (e.g. 100MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub small_file_threshold: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `reconcile` and `rehash`.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Archive directory (default: `archive_root` from config)
    #[arg(short, long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Number of hashing threads (default: all cores)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `detect`.
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Source directories
    #[arg(value_name = "SOURCE", required = true)]
    pub sources: Vec<PathBuf>,

    /// Archive directory (default: `archive_root` from config)
    #[arg(short, long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Number of hashing threads (default: all cores)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Only look at the top level of each source
    #[arg(long)]
    pub no_recurse: bool,

    /// Also write the duplicate pairings to a CSV file
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `sync`.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Archive directory (default: `archive_root` from config)
    #[arg(short, long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Mirror target; repeat for several (default: `sync_targets` from config)
    #[arg(short, long = "target", value_name = "PATH")]
    pub targets: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `backup`.
#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Source directories
    #[arg(value_name = "SOURCE", required = true)]
    pub sources: Vec<PathBuf>,

    /// Archive directory (default: `archive_root` from config)
    #[arg(short, long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Folder inside the archive to copy into (default: today's date)
    #[arg(long, value_name = "SUBDIR")]
    pub into: Option<String>,

    /// Number of hashing threads (default: all cores)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Only look at the top level of each source
    #[arg(long)]
    pub no_recurse: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Archive directory to remember
    #[arg(short, long, value_name = "PATH")]
    pub archive: PathBuf,

    /// Mirror target to remember; repeat for several
    #[arg(short, long = "target", value_name = "PATH")]
    pub targets: Vec<PathBuf>,

    /// Number of hashing threads to remember
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,
}

/// Parse a human-readable size such as `512`, `1.5GB` or `100MiB`.
///
/// Decimal suffixes (KB, MB, GB, TB) are powers of 1000, binary suffixes
/// (KiB, MiB, GiB, TiB) powers of 1024. Matching is case-insensitive.
///
/// # Errors
///
/// Returns a message for an empty string, a malformed number or an
/// unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid number: '{number}'"))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1_000,
        "KIB" => 1 << 10,
        "M" | "MB" => 1_000_000,
        "MIB" => 1 << 20,
        "G" | "GB" => 1_000_000_000,
        "GIB" => 1 << 30,
        "T" | "TB" => 1_000_000_000_000,
        "TIB" => 1 << 40,
        other => return Err(format!("Unknown size suffix: '{other}'")),
    };

    Ok((value * multiplier as f64).round() as u64)
}
