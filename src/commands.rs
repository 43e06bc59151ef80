//! Subcommand implementations for the mediavault binary.
//!
//! Each command resolves its paths against the loaded [`Config`], runs one
//! library operation with a terminal progress reporter, prints a text or
//! JSON report, and maps the result to an [`ExitCode`].

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytesize::ByteSize;
use serde::Serialize;
use yansi::Paint;

use crate::actions::{backup_files, BackupConfig};
use crate::cache::HashStore;
use crate::cli::{
    BackupArgs, Cli, CollectArgs, Commands, DetectArgs, HashArgs, InitArgs, OutputFormat,
    StoreArgs, SyncArgs,
};
use crate::config::Config;
use crate::duplicates::{DetectionReport, DetectorConfig, DuplicateDetector};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::json::{JsonBackup, JsonDetect, JsonHashes, JsonReconcile, JsonSync};
use crate::output::{CsvOutput, JsonOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::batch::{hash_files, BatchConfig};
use crate::scanner::collect_files;
use crate::signal::{cancel_after, install_handler, ShutdownHandler};
use crate::sync::{SyncConfig, SyncEngine};

/// Shared state for one CLI invocation.
struct AppContext {
    config: Config,
    config_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
    quiet: bool,
    accessible: bool,
}

impl AppContext {
    fn progress(&self) -> Arc<dyn ProgressCallback> {
        Arc::new(Progress::with_accessible(self.quiet, self.accessible))
    }

    fn archive(&self, arg: Option<&PathBuf>) -> Result<PathBuf> {
        arg.cloned()
            .or_else(|| self.config.archive_root.clone())
            .ok_or_else(|| anyhow!("No archive given: pass --archive or set archive_root in the config"))
    }

    fn threads(&self, arg: Option<usize>) -> Option<usize> {
        arg.or(self.config.threads)
    }

    fn recurse(&self, no_recurse: bool) -> bool {
        self.config.recurse && !no_recurse
    }

    fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn batch_config(&self, threads: Option<usize>) -> BatchConfig {
        let mut config = BatchConfig::default()
            .with_shutdown_flag(Arc::clone(&self.shutdown))
            .with_progress_callback(self.progress());
        if let Some(n) = self.threads(threads) {
            config = config.with_threads(n);
        }
        config
    }

    fn detector(&self, threads: Option<usize>, no_recurse: bool) -> DuplicateDetector {
        let mut config = DetectorConfig::default()
            .with_recurse(self.recurse(no_recurse))
            .with_shutdown_flag(Arc::clone(&self.shutdown))
            .with_progress_callback(self.progress());
        if let Some(n) = self.threads(threads) {
            config = config.with_threads(n);
        }
        DuplicateDetector::new(config).with_hasher(self.config.hasher())
    }

    fn open_store(&self, archive: &Path) -> Result<HashStore> {
        Ok(HashStore::open(archive)
            .with_context(|| format!("Failed to open index of {}", archive.display()))?
            .with_hasher(self.config.hasher()))
    }
}

/// Run the parsed command line.
///
/// # Errors
///
/// Returns an error for invalid input (missing archive, bad paths) or
/// failures that stop the whole operation.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let config = Config::load(cli.config.as_deref());
    log::debug!("Effective config: {:?}", config);

    let handler = install_handler().unwrap_or_else(|e| {
        log::debug!("{}; continuing without Ctrl+C handling", e);
        ShutdownHandler::new()
    });
    if let Some(secs) = cli.timeout {
        cancel_after(handler.get_flag(), Duration::from_secs(secs))?;
    }

    let ctx = AppContext {
        config,
        config_path: cli.config,
        shutdown: handler.get_flag(),
        quiet: cli.quiet,
        accessible: cli.accessible,
    };

    match cli.command {
        Commands::Collect(args) => cmd_collect(&ctx, &args),
        Commands::Hash(args) => cmd_hash(&ctx, &args),
        Commands::Reconcile(args) => cmd_reconcile(&ctx, &args, false),
        Commands::Rehash(args) => cmd_reconcile(&ctx, &args, true),
        Commands::Detect(args) => cmd_detect(&ctx, &args),
        Commands::Sync(args) => cmd_sync(&ctx, &args),
        Commands::Backup(args) => cmd_backup(&ctx, &args),
        Commands::Init(args) => cmd_init(&ctx, &args),
    }
}

fn cmd_collect(ctx: &AppContext, args: &CollectArgs) -> Result<ExitCode> {
    let files = collect_files(
        &args.roots,
        ctx.recurse(args.no_recurse),
        Some(Arc::clone(&ctx.shutdown)),
    );

    let mut out = BufWriter::new(io::stdout().lock());
    for file in &files {
        writeln!(out, "{}", file.display())?;
    }
    out.flush()?;

    Ok(if ctx.interrupted() {
        ExitCode::Interrupted
    } else if files.is_empty() {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    })
}

fn cmd_hash(ctx: &AppContext, args: &HashArgs) -> Result<ExitCode> {
    let (dirs, mut files): (Vec<PathBuf>, Vec<PathBuf>) =
        args.paths.iter().cloned().partition(|p| p.is_dir());
    files.extend(collect_files(
        &dirs,
        ctx.recurse(args.no_recurse),
        Some(Arc::clone(&ctx.shutdown)),
    ));

    let mut hasher = ctx.config.hasher();
    if let Some(threshold) = args.small_file_threshold {
        hasher = hasher.with_small_file_threshold(threshold);
    }
    let report = hash_files(&files, &hasher, &ctx.batch_config(args.threads));

    let exit = if report.interrupted() {
        ExitCode::Interrupted
    } else if !report.errors().is_empty() {
        ExitCode::PartialSuccess
    } else if report.hashes().is_empty() {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    };

    match args.output {
        OutputFormat::Json => print_json("hash", JsonHashes::from(&report), exit)?,
        OutputFormat::Text => {
            let view = JsonHashes::from(&report);
            let mut out = BufWriter::new(io::stdout().lock());
            for line in &view.hashes {
                writeln!(out, "{}  {}", line.hash, line.path.display())?;
            }
            out.flush()?;
            for err in &view.errors {
                eprintln!("{} {}", "skipped:".yellow(), err.error);
            }
            status_line(ctx, &report.completion_message());
        }
    }
    Ok(exit)
}

fn cmd_reconcile(ctx: &AppContext, args: &StoreArgs, force: bool) -> Result<ExitCode> {
    let archive = ctx.archive(args.archive.as_ref())?;
    let mut store = ctx.open_store(&archive)?;
    let batch = ctx.batch_config(args.threads);

    let outcome = if force {
        store.force_rehash(&batch)
    } else {
        store.reconcile(&batch)
    }
    .with_context(|| format!("Failed to update index of {}", archive.display()))?;

    let result = outcome.value();
    let did_work = if force {
        result.files_hashed() > 0
    } else {
        result.has_changes()
    };
    let exit = ExitCode::for_outcome(&outcome, result.hash_errors(), did_work);
    let command = if force { "rehash" } else { "reconcile" };

    match args.output {
        OutputFormat::Json => print_json(command, JsonReconcile::from(result), exit)?,
        OutputFormat::Text => {
            if outcome.is_cancelled() {
                println!("{}", "Interrupted: index not saved".yellow().bold());
            }
            println!(
                "{} {} scanned, {} new, {} modified, {} deleted",
                "Index:".bold(),
                result.files_scanned(),
                result.new_files().len().green(),
                result.modified_files().len().cyan(),
                result.deleted_files().len().red(),
            );
            if result.hash_errors() > 0 {
                println!("{} {}", "Unreadable files:".yellow(), result.hash_errors());
            }
            status_line(ctx, &result.completion_message());
        }
    }
    Ok(exit)
}

fn cmd_detect(ctx: &AppContext, args: &DetectArgs) -> Result<ExitCode> {
    let archive = ctx.archive(args.archive.as_ref())?;
    let store = ctx.open_store(&archive)?;
    if store.is_empty() {
        log::warn!(
            "Index of {} is empty; run `mediavault reconcile` first",
            archive.display()
        );
    }

    let outcome = ctx
        .detector(args.threads, args.no_recurse)
        .detect(&store.snapshot(), &args.sources)?;
    let report = outcome.value();

    if let Some(ref path) = args.csv {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        CsvOutput::new(&report.pairings)
            .write_to(BufWriter::new(file))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {} pairing(s) to {}", report.pairings.len(), path.display());
    }

    let exit = ExitCode::for_outcome(&outcome, report.failed.len(), !report.new_files.is_empty());
    match args.output {
        OutputFormat::Json => print_json("detect", JsonDetect::from(report), exit)?,
        OutputFormat::Text => print_detection(ctx, report, outcome.is_cancelled()),
    }
    Ok(exit)
}

fn print_detection(ctx: &AppContext, report: &DetectionReport, cancelled: bool) {
    if cancelled {
        println!("{}", "Interrupted: partial classification".yellow().bold());
    }
    println!(
        "{} {} files: {} new ({}), {} already archived, {} repeated in sources",
        "Sources:".bold(),
        report.source_files,
        report.new_files.len().green(),
        ByteSize::b(report.new_bytes()),
        report.master_duplicates.len().cyan(),
        report.source_duplicates.len().yellow(),
    );
    for record in &report.new_files {
        println!("  {} {}", "+".green(), record.path().display());
    }
    if log::log_enabled!(log::Level::Debug) {
        for pairing in &report.pairings {
            for master in &pairing.master_copies {
                println!("  {} {} = {}", "=".cyan(), pairing.file.display(), master.display());
            }
        }
    }
    for err in &report.failed {
        eprintln!("{} {}", "skipped:".yellow(), err);
    }
    status_line(ctx, &report.completion_message());
}

fn cmd_sync(ctx: &AppContext, args: &SyncArgs) -> Result<ExitCode> {
    let archive = ctx.archive(args.archive.as_ref())?;
    let targets = if args.targets.is_empty() {
        ctx.config.sync_targets.clone()
    } else {
        args.targets.clone()
    };

    let engine = SyncEngine::new(
        SyncConfig::default()
            .with_temp_dir_name(ctx.config.temp_dir_name.clone())
            .with_shutdown_flag(Arc::clone(&ctx.shutdown))
            .with_progress_callback(ctx.progress()),
    );
    let outcome = engine.sync(&archive, &targets)?;
    let result = outcome.value();
    let totals = result.totals();
    let exit = ExitCode::for_outcome(&outcome, result.failed.len(), !totals.is_noop());

    match args.output {
        OutputFormat::Json => print_json("sync", JsonSync::from(result), exit)?,
        OutputFormat::Text => {
            if outcome.is_cancelled() {
                println!("{}", "Interrupted: targets may be incomplete".yellow().bold());
            }
            for (target, stats) in &result.stats {
                let mark = if result.failed.contains_key(target) {
                    "FAILED".red().bold()
                } else if result.succeeded.contains(target) {
                    "ok".green().bold()
                } else {
                    "stopped".yellow().bold()
                };
                println!(
                    "{} {}: {} copied ({}), {} up to date, {} deleted",
                    mark,
                    target.display(),
                    stats.copied,
                    ByteSize::b(stats.bytes_copied),
                    stats.skipped,
                    stats.deleted,
                );
            }
            for (target, error) in &result.failed {
                eprintln!("{} {}: {}", "error:".red(), target.display(), error);
            }
            status_line(ctx, &format!("Completed in {:.2?}", result.duration));
        }
    }
    Ok(exit)
}

fn cmd_backup(ctx: &AppContext, args: &BackupArgs) -> Result<ExitCode> {
    let archive = ctx.archive(args.archive.as_ref())?;
    let mut store = ctx.open_store(&archive)?;
    let batch = ctx.batch_config(args.threads);

    // Bring the index up to date so files already archived are recognised.
    if store.reconcile(&batch)?.is_cancelled() {
        return Ok(ExitCode::Interrupted);
    }

    let detection = ctx
        .detector(args.threads, args.no_recurse)
        .detect(&store.snapshot(), &args.sources)?;
    if detection.is_cancelled() {
        return Ok(ExitCode::Interrupted);
    }
    let mut detection = detection.into_inner();

    let subdir = args
        .into
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let backup_config = BackupConfig::default()
        .with_temp_dir_name(ctx.config.temp_dir_name.clone())
        .with_shutdown_flag(Arc::clone(&ctx.shutdown))
        .with_progress_callback(ctx.progress());
    let outcome = backup_files(
        &detection.new_files,
        &mut detection.states,
        &archive,
        &subdir,
        &backup_config,
    )?;
    let report = outcome.value();

    if !report.copied.is_empty() && !outcome.is_cancelled() {
        store
            .reconcile(&batch)
            .context("Files were copied but the index could not be updated")?;
    }

    let exit = ExitCode::for_outcome(
        &outcome,
        report.failure_count() + detection.failed.len(),
        report.success_count() > 0,
    );
    match args.output {
        OutputFormat::Json => print_json("backup", JsonBackup::from(report), exit)?,
        OutputFormat::Text => {
            if outcome.is_cancelled() {
                println!("{}", "Interrupted: backup incomplete".yellow().bold());
            }
            for copied in &report.copied {
                println!("  {} {}", "+".green(), copied.destination.display());
            }
            for (path, err) in &report.failures {
                eprintln!("{} {}: {}", "error:".red(), path.display(), err);
            }
            println!(
                "{} {} ({} already archived)",
                "Backup:".bold(),
                report.summary(),
                detection.master_duplicates.len()
            );
        }
    }
    Ok(exit)
}

fn cmd_init(ctx: &AppContext, args: &InitArgs) -> Result<ExitCode> {
    let config = Config {
        archive_root: Some(std::path::absolute(&args.archive)?),
        sync_targets: args
            .targets
            .iter()
            .map(std::path::absolute)
            .collect::<io::Result<_>>()?,
        threads: args.threads.or(ctx.config.threads),
        ..ctx.config.clone()
    };
    let path = config.save(ctx.config_path.as_deref())?;
    println!("{} {}", "Wrote".green().bold(), path.display());
    Ok(ExitCode::Success)
}

fn print_json<T: Serialize>(command: &str, report: T, exit: ExitCode) -> Result<()> {
    let output = JsonOutput::new(command, report, exit);
    output
        .write_to(&mut io::stdout().lock(), true)
        .context("Failed to write JSON output")
}

fn status_line(ctx: &AppContext, message: &str) {
    if !ctx.quiet {
        eprintln!("{}", message.dim());
    }
}
