//! JSON output for command reports.
//!
//! Every command prints the same envelope; only `report` differs:
//!
//! ```json
//! {
//!   "command": "reconcile",
//!   "generated_at": "2024-05-01T10:00:00+00:00",
//!   "interrupted": false,
//!   "exit_code": 0,
//!   "exit_code_name": "MV000",
//!   "report": { "files_scanned": 120, "new_files": { "a.jpg": "00ab..." } }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::actions::BackupReport;
use crate::cache::ValidationResult;
use crate::duplicates::DetectionReport;
use crate::error::ExitCode;
use crate::scanner::batch::BatchReport;
use crate::scanner::ContentHash;
use crate::sync::{SyncOutcome, TargetStats};

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

/// Envelope around a command report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<T: Serialize> {
    /// Subcommand name
    pub command: String,
    /// RFC 3339 creation time
    pub generated_at: String,
    /// Whether the run was cancelled
    pub interrupted: bool,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "MV000")
    pub exit_code_name: String,
    /// Command-specific payload
    pub report: T,
}

impl<T: Serialize> JsonOutput<T> {
    /// Wrap `report` for `command`.
    #[must_use]
    pub fn new(command: &str, report: T, exit_code: ExitCode) -> Self {
        Self {
            command: command.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            interrupted: exit_code == ExitCode::Interrupted,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
            report,
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// A file that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFileError {
    /// Affected path
    pub path: PathBuf,
    /// Error description
    pub error: String,
}

/// One hashed file.
#[derive(Debug, Clone, Serialize)]
pub struct JsonHash {
    /// Hashed path
    pub path: PathBuf,
    /// Content identity
    pub hash: ContentHash,
}

/// Result of hashing an explicit file list.
#[derive(Debug, Clone, Serialize)]
pub struct JsonHashes {
    /// Hashes, sorted by path
    pub hashes: Vec<JsonHash>,
    /// Files that could not be hashed
    pub errors: Vec<JsonFileError>,
    /// Worker threads used
    pub threads: usize,
    /// Bytes read
    pub bytes_hashed: u64,
    /// Read throughput
    pub throughput_mb_s: f64,
}

impl From<&BatchReport> for JsonHashes {
    fn from(report: &BatchReport) -> Self {
        let mut hashes: Vec<JsonHash> = report
            .hashes()
            .iter()
            .map(|(path, hash)| JsonHash {
                path: path.clone(),
                hash: *hash,
            })
            .collect();
        hashes.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            hashes,
            errors: report
                .errors()
                .iter()
                .map(|e| JsonFileError {
                    path: e.path().to_path_buf(),
                    error: e.to_string(),
                })
                .collect(),
            threads: report.threads(),
            bytes_hashed: report.bytes_hashed(),
            throughput_mb_s: report.throughput_mb_s(),
        }
    }
}

/// Reconcile or rehash report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReconcile<'a> {
    /// Files found in the archive
    pub files_scanned: usize,
    /// Files hashed in this run
    pub files_hashed: usize,
    /// Files that could not be hashed
    pub hash_errors: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Added entries
    pub new_files: &'a BTreeMap<String, ContentHash>,
    /// Updated entries
    pub modified_files: &'a BTreeMap<String, ContentHash>,
    /// Removed entries
    pub deleted_files: &'a BTreeMap<String, ContentHash>,
}

impl<'a> From<&'a ValidationResult> for JsonReconcile<'a> {
    fn from(result: &'a ValidationResult) -> Self {
        Self {
            files_scanned: result.files_scanned(),
            files_hashed: result.files_hashed(),
            hash_errors: result.hash_errors(),
            bytes_hashed: result.bytes_hashed(),
            processing_time_ms: millis(result.processing_time()),
            new_files: result.new_files(),
            modified_files: result.modified_files(),
            deleted_files: result.deleted_files(),
        }
    }
}

/// Detection report with hashing failures spelled out.
#[derive(Debug, Serialize)]
pub struct JsonDetect<'a> {
    /// Bytes a backup of the new files would copy
    pub new_bytes: u64,
    /// Full classification
    #[serde(flatten)]
    pub detection: &'a DetectionReport,
    /// Files that could not be hashed
    pub errors: Vec<JsonFileError>,
}

impl<'a> From<&'a DetectionReport> for JsonDetect<'a> {
    fn from(report: &'a DetectionReport) -> Self {
        Self {
            new_bytes: report.new_bytes(),
            detection: report,
            errors: report
                .failed
                .iter()
                .map(|e| JsonFileError {
                    path: e.path().to_path_buf(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Sync result for one target.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSyncTarget {
    /// Target root
    pub path: PathBuf,
    /// `succeeded`, `failed` or `cancelled`
    pub status: &'static str,
    /// First error, for failed targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Counters
    #[serde(flatten)]
    pub stats: TargetStats,
}

/// Sync report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSync {
    /// Per-target results, sorted by path
    pub targets: Vec<JsonSyncTarget>,
    /// Totals over all targets
    pub totals: TargetStats,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl From<&SyncOutcome> for JsonSync {
    fn from(outcome: &SyncOutcome) -> Self {
        let paths: BTreeSet<&PathBuf> = outcome
            .stats
            .keys()
            .chain(outcome.failed.keys())
            .chain(outcome.succeeded.iter())
            .collect();
        let targets = paths
            .into_iter()
            .map(|path| {
                let stats = outcome.stats.get(path).cloned().unwrap_or_default();
                let error = outcome.failed.get(path).cloned();
                let status = if error.is_some() {
                    "failed"
                } else if outcome.succeeded.contains(path) {
                    "succeeded"
                } else {
                    "cancelled"
                };
                JsonSyncTarget {
                    path: path.clone(),
                    status,
                    error,
                    stats,
                }
            })
            .collect();
        Self {
            targets,
            totals: outcome.totals(),
            duration_ms: millis(outcome.duration),
        }
    }
}

/// One copied file.
#[derive(Debug, Clone, Serialize)]
pub struct JsonCopied {
    /// Original location
    pub source: PathBuf,
    /// Location in the archive
    pub destination: PathBuf,
    /// Bytes copied
    pub size: u64,
}

/// Backup report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonBackup {
    /// Copied files
    pub copied: Vec<JsonCopied>,
    /// Failed copies
    pub failed: Vec<JsonFileError>,
    /// Records not selected for copying
    pub unselected: usize,
    /// Total bytes copied
    pub bytes_copied: u64,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl From<&BackupReport> for JsonBackup {
    fn from(report: &BackupReport) -> Self {
        Self {
            copied: report
                .copied
                .iter()
                .map(|c| JsonCopied {
                    source: c.source.clone(),
                    destination: c.destination.clone(),
                    size: c.size,
                })
                .collect(),
            failed: report
                .failures
                .iter()
                .map(|(path, e)| JsonFileError {
                    path: path.clone(),
                    error: e.to_string(),
                })
                .collect(),
            unselected: report.unselected,
            bytes_copied: report.bytes_copied,
            duration_ms: millis(report.duration),
        }
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
