//! Archive mirroring to secondary locations.
//!
//! [`SyncEngine`] makes each target tree an exact copy of the archive,
//! using size and modification time to decide what to copy. Targets are
//! processed one after another and independently: a failing target never
//! stops the others.
//!
//! # Example
//!
//! ```no_run
//! use mediavault::sync::{SyncConfig, SyncEngine};
//! use std::path::{Path, PathBuf};
//!
//! let engine = SyncEngine::new(SyncConfig::default());
//! let outcome = engine
//!     .sync(Path::new("/archive"), &[PathBuf::from("/mnt/usb/archive")])
//!     .unwrap();
//! for target in &outcome.value().succeeded {
//!     println!("mirrored {}", target.display());
//! }
//! ```

mod mirror;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use self::mirror::{Mirror, MirrorEnd};
use crate::operation::Outcome;
use crate::progress::ProgressCallback;

/// Default name of the temp-work directory skipped by sync.
pub const DEFAULT_TEMP_DIR_NAME: &str = ".mediavault-tmp";

/// Files above this size report progress immediately (10 MiB).
pub const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Progress is reported every this many files.
pub const PROGRESS_EVERY: usize = 10;

/// Configuration for the sync engine.
#[derive(Clone)]
pub struct SyncConfig {
    /// Directory name never mirrored nor cleaned up
    pub temp_dir_name: String,
    /// Size above which a single file triggers a progress update
    pub large_file_threshold: u64,
    /// Files between regular progress updates
    pub progress_every: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("temp_dir_name", &self.temp_dir_name)
            .field("large_file_threshold", &self.large_file_threshold)
            .field("progress_every", &self.progress_every)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            temp_dir_name: DEFAULT_TEMP_DIR_NAME.to_string(),
            large_file_threshold: LARGE_FILE_THRESHOLD,
            progress_every: PROGRESS_EVERY,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl SyncConfig {
    /// Set the temp-work directory name.
    #[must_use]
    pub fn with_temp_dir_name(mut self, name: impl Into<String>) -> Self {
        self.temp_dir_name = name.into();
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Counters for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetStats {
    /// Archive files taking part in mirroring
    pub files_total: usize,
    /// Their total size
    pub bytes_total: u64,
    /// Files copied
    pub copied: usize,
    /// Files already up to date
    pub skipped: usize,
    /// Orphan files deleted from the target
    pub deleted: usize,
    /// Orphan directories removed from the target
    pub dirs_removed: usize,
    /// Bytes written
    pub bytes_copied: u64,
    /// Per-file errors
    pub errors: usize,
}

impl TargetStats {
    /// Whether the run changed nothing in the target.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.copied == 0 && self.deleted == 0 && self.dirs_removed == 0
    }
}

/// Result of a sync over all targets.
///
/// A cancelled target appears in neither `succeeded` nor `failed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    /// Targets that are now exact mirrors
    pub succeeded: BTreeSet<PathBuf>,
    /// Targets that hit an error, with a description
    pub failed: BTreeMap<PathBuf, String>,
    /// Counters per processed target
    pub stats: BTreeMap<PathBuf, TargetStats>,
    /// Wall time of the whole run
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncOutcome {
    /// Sum of the counters over all targets.
    #[must_use]
    pub fn totals(&self) -> TargetStats {
        self.stats
            .values()
            .fold(TargetStats::default(), |mut acc, s| {
                acc.files_total += s.files_total;
                acc.bytes_total += s.bytes_total;
                acc.copied += s.copied;
                acc.skipped += s.skipped;
                acc.deleted += s.deleted;
                acc.dirs_removed += s.dirs_removed;
                acc.bytes_copied += s.bytes_copied;
                acc.errors += s.errors;
                acc
            })
    }
}

/// Errors raised before any file is touched.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// The archive root does not exist.
    #[error("Archive root not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// The archive root is not a directory.
    #[error("Archive root is not a directory: {0}")]
    ArchiveNotADirectory(PathBuf),

    /// No sync target was given.
    #[error("No sync targets given")]
    NoTargets,

    /// A target is the archive or lies inside it.
    #[error("Sync target {0} is inside the archive")]
    TargetInsideArchive(PathBuf),

    /// The archive lies inside a target; cleanup would delete it.
    #[error("Sync target {0} contains the archive")]
    TargetContainsArchive(PathBuf),
}

/// Mirrors the archive into target trees.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Mirror `archive_root` into every target, one after another.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the archive is missing, no target is given,
    /// or a target overlaps the archive. Problems while copying are
    /// reported per target in [`SyncOutcome::failed`].
    pub fn sync(
        &self,
        archive_root: &Path,
        targets: &[PathBuf],
    ) -> Result<Outcome<SyncOutcome>, SyncError> {
        let start = Instant::now();
        self.validate(archive_root, targets)?;

        let mut outcome = SyncOutcome::default();
        for target in targets {
            if self.config.is_shutdown_requested() {
                outcome.duration = start.elapsed();
                return Ok(Outcome::Cancelled(outcome));
            }

            log::info!("Mirroring {} -> {}", archive_root.display(), target.display());
            let mut mirror = Mirror::new(archive_root, target, &self.config);
            let end = mirror.run();
            outcome.stats.insert(target.clone(), mirror.stats().clone());

            match end {
                Ok(MirrorEnd::Cancelled) => {
                    log::info!("Sync of {} cancelled", target.display());
                    outcome.duration = start.elapsed();
                    return Ok(Outcome::Cancelled(outcome));
                }
                Ok(MirrorEnd::Finished) => {
                    let stats = mirror.stats();
                    log::info!(
                        "{}: {} copied, {} up to date, {} deleted, {} errors",
                        target.display(),
                        stats.copied,
                        stats.skipped,
                        stats.deleted,
                        stats.errors
                    );
                    match mirror.first_error() {
                        Some(error) => {
                            let description =
                                format!("{} file error(s), first: {}", stats.errors, error);
                            outcome.failed.insert(target.clone(), description);
                        }
                        None => {
                            outcome.succeeded.insert(target.clone());
                        }
                    }
                }
                Err(description) => {
                    log::warn!("Sync of {} failed: {}", target.display(), description);
                    outcome.failed.insert(target.clone(), description);
                }
            }
        }

        outcome.duration = start.elapsed();
        Ok(Outcome::Completed(outcome))
    }

    fn validate(&self, archive_root: &Path, targets: &[PathBuf]) -> Result<(), SyncError> {
        match std::fs::metadata(archive_root) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Err(SyncError::ArchiveNotADirectory(archive_root.to_path_buf())),
            Err(_) => return Err(SyncError::ArchiveNotFound(archive_root.to_path_buf())),
        }
        if targets.is_empty() {
            return Err(SyncError::NoTargets);
        }

        let archive = resolve(archive_root);
        for target in targets {
            let resolved = resolve(target);
            if resolved.starts_with(&archive) {
                return Err(SyncError::TargetInsideArchive(target.clone()));
            }
            if archive.starts_with(&resolved) {
                return Err(SyncError::TargetContainsArchive(target.clone()));
            }
        }
        Ok(())
    }
}

/// Canonical form of a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized and the rest appended.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}
