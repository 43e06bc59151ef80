//! Mirroring of the archive into a single target tree.
//!
//! A target is brought in line with the archive in two passes:
//!
//! 1. **Copy**: depth-first, name-sorted walk of the archive. A file is
//!    copied when the target copy is missing or differs in size or exact
//!    modification time; the source mtime is then stamped on the copy so
//!    the next run sees it as current.
//! 2. **Cleanup**: walk of the target, children first. Files without an
//!    archive counterpart are deleted; directories without one are removed
//!    when empty.
//!
//! The index file and the temp-work directory are never mirrored and never
//! cleaned up.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use filetime::FileTime;
use tempfile::NamedTempFile;
use walkdir::{DirEntry, WalkDir};

use super::{SyncConfig, TargetStats};
use crate::cache::STORE_FILE_NAME;
use crate::progress::{phase, ProgressUpdate};
use crate::scanner::path_utils::display_name;

/// How a mirror run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MirrorEnd {
    /// Both passes ran to the end.
    Finished,
    /// Shutdown was observed.
    Cancelled,
}

/// One archive → target mirror run.
pub(crate) struct Mirror<'a> {
    archive: &'a Path,
    target: &'a Path,
    config: &'a SyncConfig,
    stats: TargetStats,
    first_error: Option<String>,
}

impl<'a> Mirror<'a> {
    pub(crate) fn new(archive: &'a Path, target: &'a Path, config: &'a SyncConfig) -> Self {
        Self {
            archive,
            target,
            config,
            stats: TargetStats::default(),
            first_error: None,
        }
    }

    /// Counters collected so far.
    pub(crate) fn stats(&self) -> &TargetStats {
        &self.stats
    }

    /// Description of the first error, if any occurred.
    pub(crate) fn first_error(&self) -> Option<&str> {
        self.first_error.as_deref()
    }

    fn record_error(&mut self, message: String) {
        log::warn!("{}", message);
        self.stats.errors += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message);
        }
    }

    /// Count the archive files and bytes that take part in mirroring.
    pub(crate) fn precount(&mut self) {
        let temp_dir_name = self.config.temp_dir_name.as_str();
        let (files, bytes) = WalkDir::new(self.archive)
            .follow_links(true)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_excluded(e, temp_dir_name))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .fold((0usize, 0u64), |(n, b), m| (n + 1, b + m.len()));
        self.stats.files_total = files;
        self.stats.bytes_total = bytes;
    }

    /// Run both passes.
    ///
    /// # Errors
    ///
    /// Returns a description if the target root cannot be created; per-file
    /// problems are only counted.
    pub(crate) fn run(&mut self) -> Result<MirrorEnd, String> {
        self.precount();
        fs::create_dir_all(self.target)
            .map_err(|e| format!("cannot create {}: {}", self.target.display(), e))?;

        if self.copy_pass() == MirrorEnd::Cancelled {
            return Ok(MirrorEnd::Cancelled);
        }
        Ok(self.cleanup_pass())
    }

    fn copy_pass(&mut self) -> MirrorEnd {
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_phase_start(phase::SYNC, self.stats.files_total);
        }

        let mut processed = 0usize;
        let temp_dir_name = self.config.temp_dir_name.clone();
        let walker = WalkDir::new(self.archive)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_excluded(e, &temp_dir_name));

        for result in walker {
            if self.config.is_shutdown_requested() {
                log::debug!("Sync: Shutdown requested, stopping copy pass");
                return MirrorEnd::Cancelled;
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    self.record_error(format!("cannot read archive entry: {e}"));
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(self.archive) else {
                continue;
            };
            let dest = self.target.join(relative);

            if entry.file_type().is_dir() {
                if let Err(e) = fs::create_dir_all(&dest) {
                    self.record_error(format!("cannot create {}: {}", dest.display(), e));
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let size = self.mirror_file(entry.path(), &dest);
            processed += 1;

            if processed % self.config.progress_every.max(1) == 0
                || size > self.config.large_file_threshold
                || processed == self.stats.files_total
            {
                if let Some(ref cb) = callback {
                    let update = ProgressUpdate::new(
                        processed,
                        self.stats.files_total,
                        display_name(entry.path()),
                    )
                    .with_errors(self.stats.errors)
                    .with_bytes(self.stats.bytes_copied);
                    cb.on_progress(&update);
                }
            }
        }

        if let Some(ref cb) = callback {
            cb.on_phase_end(phase::SYNC);
        }
        MirrorEnd::Finished
    }

    /// Copy one file if needed. Returns the source size.
    fn mirror_file(&mut self, source: &Path, dest: &Path) -> u64 {
        let source_meta = match fs::metadata(source) {
            Ok(m) => m,
            Err(e) => {
                self.record_error(format!("cannot read {}: {}", source.display(), e));
                return 0;
            }
        };
        let size = source_meta.len();
        let source_mtime = FileTime::from_last_modification_time(&source_meta);

        let up_to_date = fs::metadata(dest).is_ok_and(|m| {
            m.is_file()
                && m.len() == size
                && FileTime::from_last_modification_time(&m) == source_mtime
        });
        if up_to_date {
            self.stats.skipped += 1;
            return size;
        }

        match replace_file(source, dest, &source_meta, source_mtime) {
            Ok(bytes) => {
                log::trace!("Copied {} -> {}", source.display(), dest.display());
                self.stats.copied += 1;
                self.stats.bytes_copied += bytes;
            }
            Err(e) => self.record_error(format!(
                "cannot copy {} to {}: {}",
                source.display(),
                dest.display(),
                e
            )),
        }
        size
    }

    fn cleanup_pass(&mut self) -> MirrorEnd {
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_phase_start(phase::CLEANUP, 0);
        }

        let temp_dir_name = self.config.temp_dir_name.clone();
        let entries = WalkDir::new(self.target)
            .min_depth(1)
            .contents_first(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_excluded(e, &temp_dir_name))
            .filter_map(Result::ok);

        for entry in entries {
            if self.config.is_shutdown_requested() {
                log::debug!("Sync: Shutdown requested, stopping cleanup");
                return MirrorEnd::Cancelled;
            }
            let Ok(relative) = entry.path().strip_prefix(self.target) else {
                continue;
            };
            let source = self.archive.join(relative);

            if entry.file_type().is_dir() {
                if !source.is_dir() && fs::remove_dir(entry.path()).is_ok() {
                    log::debug!("Removed orphan directory {}", entry.path().display());
                    self.stats.dirs_removed += 1;
                }
            } else if !source.is_file() {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {
                        log::debug!("Deleted orphan {}", entry.path().display());
                        self.stats.deleted += 1;
                    }
                    Err(e) => self.record_error(format!(
                        "cannot delete {}: {}",
                        entry.path().display(),
                        e
                    )),
                }
            }
        }

        if let Some(ref cb) = callback {
            cb.on_phase_end(phase::CLEANUP);
        }
        MirrorEnd::Finished
    }
}

/// Whether an entry of a tree rooted at depth 0 is excluded from mirroring.
fn is_excluded(entry: &DirEntry, temp_dir_name: &str) -> bool {
    let name = entry.file_name();
    if entry.file_type().is_dir() {
        entry.depth() >= 1 && name == temp_dir_name
    } else {
        entry.depth() == 1 && name == STORE_FILE_NAME
    }
}

/// Write `source` to a temporary file beside `dest` and rename it over
/// `dest`. An existing copy is replaced, never opened for writing.
fn replace_file(
    source: &Path,
    dest: &Path,
    source_meta: &fs::Metadata,
    mtime: FileTime,
) -> io::Result<u64> {
    let parent = dest.parent().unwrap_or(dest);
    let mut temp = NamedTempFile::new_in(parent)?;
    let bytes = io::copy(&mut File::open(source)?, temp.as_file_mut())?;
    filetime::set_file_handle_times(temp.as_file(), None, Some(mtime))?;
    temp.as_file().set_permissions(source_meta.permissions())?;
    temp.persist(dest).map_err(|e| e.error)?;
    Ok(bytes)
}
