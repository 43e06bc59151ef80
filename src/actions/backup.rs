//! Copying of new files into the archive.
//!
//! # Overview
//!
//! [`backup_files`] copies every selected record into a folder of the
//! archive:
//! - Free space at the destination is checked before each copy
//! - Existing files are never overwritten; names get a `_N` suffix
//! - Data is written to the temp-work directory first, then moved into
//!   place, so a half-written file never appears in the archive
//! - The source modification time is kept on the copy
//!
//! Status transitions are recorded on the [`RecordStates`] board:
//! `InProgress`, then `Completed` or `Error`.
//!
//! # Example
//!
//! ```no_run
//! use mediavault::actions::backup::{backup_files, BackupConfig};
//! use mediavault::records::RecordStates;
//! use std::path::Path;
//!
//! let records = Vec::new();
//! let mut states = RecordStates::new();
//! let outcome = backup_files(&records, &mut states, Path::new("/archive"), "2024-import", &BackupConfig::default())
//!     .unwrap();
//! println!("{}", outcome.value().summary());
//! ```

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use filetime::FileTime;
use sysinfo::Disks;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::operation::Outcome;
use crate::progress::{phase, ProgressCallback, ProgressUpdate};
use crate::records::{RecordStates, RecordStatus};
use crate::scanner::path_utils::display_name;
use crate::scanner::FileRecord;
use crate::sync::DEFAULT_TEMP_DIR_NAME;

/// Error type for backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The archive root does not exist or is not a directory.
    #[error("archive root not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// The destination folder is not a plain relative path inside the archive.
    #[error("destination folder must be relative and stay inside the archive: {0:?}")]
    InvalidDestination(String),

    /// Not enough free space at the destination for this file.
    #[error("insufficient space for {path}: {required} bytes required, {available} available")]
    InsufficientSpace {
        /// File that could not be copied
        path: PathBuf,
        /// Bytes needed
        required: u64,
        /// Bytes free at the destination
        available: u64,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Free-space lookup for a destination directory.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available on the volume holding `path`, or `None` if unknown.
    fn available_space(&self, path: &Path) -> Option<u64>;
}

/// [`SpaceProbe`] backed by the system's mounted disks.
///
/// The disk whose mount point is the longest prefix of the path wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SpaceProbe for SystemSpaceProbe {
    fn available_space(&self, path: &Path) -> Option<u64> {
        let path = path.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(sysinfo::Disk::available_space)
    }
}

/// Configuration for backup operations.
#[derive(Clone)]
pub struct BackupConfig {
    /// Name of the temp-work directory in the archive root
    pub temp_dir_name: String,
    /// Free-space lookup
    pub space_probe: Arc<dyn SpaceProbe>,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupConfig")
            .field("temp_dir_name", &self.temp_dir_name)
            .field("space_probe", &"<probe>")
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            temp_dir_name: DEFAULT_TEMP_DIR_NAME.to_string(),
            space_probe: Arc::new(SystemSpaceProbe),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl BackupConfig {
    /// Set the temp-work directory name.
    #[must_use]
    pub fn with_temp_dir_name(mut self, name: impl Into<String>) -> Self {
        self.temp_dir_name = name.into();
        self
    }

    /// Replace the free-space lookup.
    #[must_use]
    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = probe;
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

/// A file copied into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    /// Original location
    pub source: PathBuf,
    /// Location in the archive
    pub destination: PathBuf,
    /// Bytes copied
    pub size: u64,
}

/// Results of a backup run.
#[derive(Debug, Default)]
pub struct BackupReport {
    /// Successfully copied files.
    pub copied: Vec<CopiedFile>,
    /// Failed copies with their errors.
    pub failures: Vec<(PathBuf, BackupError)>,
    /// Records skipped because they were not selected.
    pub unselected: usize,
    /// Total bytes copied.
    pub bytes_copied: u64,
    /// Wall time of the run.
    pub duration: Duration,
}

impl BackupReport {
    /// Number of successful copies.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.copied.len()
    }

    /// Number of failed copies.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Check if all copies succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let size = bytesize::ByteSize::b(self.bytes_copied);
        if self.all_succeeded() {
            format!("Backed up {} file(s), {}", self.success_count(), size)
        } else {
            format!(
                "Backed up {} file(s), {} failed, {}",
                self.success_count(),
                self.failure_count(),
                size
            )
        }
    }
}

/// Copy every selected record into `archive_root/dest_subdir`.
///
/// Per-file problems (including insufficient space) are collected in the
/// report and do not stop the run.
///
/// # Errors
///
/// Returns [`BackupError::ArchiveNotFound`] if the archive root is missing,
/// [`BackupError::InvalidDestination`] if `dest_subdir` is absolute or
/// contains `..`, or [`BackupError::Io`] if the destination folder cannot
/// be created.
pub fn backup_files(
    records: &[FileRecord],
    states: &mut RecordStates,
    archive_root: &Path,
    dest_subdir: &str,
    config: &BackupConfig,
) -> Result<Outcome<BackupReport>, BackupError> {
    if !archive_root.is_dir() {
        return Err(BackupError::ArchiveNotFound(archive_root.to_path_buf()));
    }
    if !Path::new(dest_subdir)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(BackupError::InvalidDestination(dest_subdir.to_string()));
    }
    let start = Instant::now();
    let dest_dir = archive_root.join(dest_subdir);
    fs::create_dir_all(&dest_dir).map_err(|e| BackupError::io(&dest_dir, e))?;
    let temp_dir = archive_root.join(&config.temp_dir_name);
    fs::create_dir_all(&temp_dir).map_err(|e| BackupError::io(&temp_dir, e))?;

    let selected: Vec<&FileRecord> = records
        .iter()
        .filter(|r| states.is_selected(r.path()))
        .collect();
    let mut report = BackupReport {
        unselected: records.len() - selected.len(),
        ..Default::default()
    };
    log::info!(
        "Backing up {} file(s) into {}",
        selected.len(),
        dest_dir.display()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_start(phase::BACKUP, selected.len());
    }

    let mut cancelled = false;
    for (index, record) in selected.iter().enumerate() {
        if config.is_shutdown_requested() {
            log::debug!("Backup: Shutdown requested, stopping");
            cancelled = true;
            break;
        }

        states.set_status(record.path(), RecordStatus::InProgress);
        match copy_one(record, &dest_dir, &temp_dir, config) {
            Ok(copied) => {
                log::debug!(
                    "Backed up {} -> {}",
                    copied.source.display(),
                    copied.destination.display()
                );
                states.set_status(record.path(), RecordStatus::Completed);
                report.bytes_copied += copied.size;
                report.copied.push(copied);
            }
            Err(e) => {
                log::warn!("Backup of {} failed: {}", record.path().display(), e);
                states.set_status(record.path(), RecordStatus::Error);
                report.failures.push((record.path().to_path_buf(), e));
            }
        }

        if let Some(ref cb) = config.progress_callback {
            let update = ProgressUpdate::new(index + 1, selected.len(), display_name(record.path()))
                .with_errors(report.failures.len())
                .with_bytes(report.bytes_copied);
            cb.on_progress(&update);
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_phase_end(phase::BACKUP);
    }
    // Only succeeds when nothing was left behind.
    let _ = fs::remove_dir(&temp_dir);

    report.duration = start.elapsed();
    log::info!("{}", report.summary());
    Ok(Outcome::from_flag(cancelled, report))
}

fn copy_one(
    record: &FileRecord,
    dest_dir: &Path,
    temp_dir: &Path,
    config: &BackupConfig,
) -> Result<CopiedFile, BackupError> {
    let source = record.path();
    let metadata = fs::metadata(source).map_err(|e| BackupError::io(source, e))?;
    let required = metadata.len();

    if let Some(available) = config.space_probe.available_space(dest_dir) {
        if available < required {
            return Err(BackupError::InsufficientSpace {
                path: source.to_path_buf(),
                required,
                available,
            });
        }
    }

    let mut temp = NamedTempFile::new_in(temp_dir).map_err(|e| BackupError::io(temp_dir, e))?;
    let mut input = File::open(source).map_err(|e| BackupError::io(source, e))?;
    let size = io::copy(&mut input, temp.as_file_mut()).map_err(|e| BackupError::io(source, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| BackupError::io(temp.path(), e))?;

    let file_name = source
        .file_name()
        .map_or_else(|| "unnamed".into(), |n| n.to_os_string());
    let mut destination = unique_destination(dest_dir, Path::new(&file_name));
    // Retry if another writer took the name between the check and the rename.
    loop {
        match temp.persist_noclobber(&destination) {
            Ok(_) => break,
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                temp = e.file;
                destination = unique_destination(dest_dir, Path::new(&file_name));
            }
            Err(e) => return Err(BackupError::io(&destination, e.error)),
        }
    }

    filetime::set_file_mtime(&destination, FileTime::from_last_modification_time(&metadata))
        .map_err(|e| BackupError::io(&destination, e))?;

    Ok(CopiedFile {
        source: source.to_path_buf(),
        destination,
        size,
    })
}

/// First free name for `file_name` in `dir`: `name.ext`, `name_1.ext`, ...
#[must_use]
pub fn unique_destination(dir: &Path, file_name: &Path) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|n| dir.join(format!("{stem}_{n}{extension}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
