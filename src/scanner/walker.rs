//! Directory walker for multimedia file discovery.
//!
//! # Overview
//!
//! [`Walker`] traverses one root with [`walkdir`], sorted by file name so
//! two walks over the same tree always yield the same order. Only files
//! with a known image or video extension are reported.
//!
//! # Features
//!
//! - Deterministic, name-sorted depth-first traversal
//! - Optional non-recursive mode (direct children only)
//! - Symlinks followed, cycles detected and skipped
//! - Excluded file names (e.g. the archive index) and skipped directories
//! - Graceful shutdown via atomic flag, polled between entries
//!
//! # Example
//!
//! ```no_run
//! use mediavault::scanner::walker::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/photos"), WalkerConfig::default());
//! for file in walker.collect_entries() {
//!     println!("{}: {} bytes", file.path.display(), file.size);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use super::{is_media_file, FileEntry, ScanError};

/// Configuration for a single walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Descend into subdirectories
    pub recurse: bool,
    /// File names never reported (matched against the final component)
    pub exclude_file_names: Vec<String>,
    /// Directory names whose whole subtree is skipped
    pub skip_dir_names: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            recurse: true,
            exclude_file_names: Vec::new(),
            skip_dir_names: Vec::new(),
        }
    }
}

impl WalkerConfig {
    /// Set recursion.
    #[must_use]
    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Exclude files with this exact name.
    #[must_use]
    pub fn exclude_file(mut self, name: impl Into<String>) -> Self {
        self.exclude_file_names.push(name.into());
        self
    }

    /// Skip directories with this exact name.
    #[must_use]
    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        self.skip_dir_names.push(name.into());
        self
    }
}

/// Directory walker restricted to multimedia files.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given root.
    #[must_use]
    pub fn new(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set the walk stops before the next entry and
    /// whatever was found so far is returned.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root this walker starts from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Verify that the root exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] or [`ScanError::NotADirectory`].
    pub fn check_root(&self) -> Result<(), ScanError> {
        match std::fs::metadata(&self.root) {
            Ok(m) if m.is_dir() => Ok(()),
            Ok(_) => Err(ScanError::NotADirectory(self.root.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScanError::NotFound(self.root.clone()))
            }
            Err(e) => Err(ScanError::Io {
                path: self.root.clone(),
                source: e,
            }),
        }
    }

    /// Walk the tree, yielding multimedia file entries.
    ///
    /// Unreadable entries and symlink loops are yielded as [`ScanError`]
    /// values rather than stopping iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let mut walk_dir = WalkDir::new(&self.root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name();
        if !self.config.recurse {
            walk_dir = walk_dir.max_depth(1);
        }

        walk_dir
            .into_iter()
            .filter_entry(move |entry| !self.is_skipped_dir(entry))
            .take_while(move |_| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |result| match result {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    if e.loop_ancestor().is_some() {
                        log::debug!("Skipping symlink loop: {}", path.display());
                    } else {
                        log::debug!("Skipping unreadable entry {}: {}", path.display(), e);
                    }
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            })
    }

    /// Walk the tree and keep only successfully read entries.
    #[must_use]
    pub fn collect_entries(&self) -> Vec<FileEntry> {
        self.walk().filter_map(Result::ok).collect()
    }

    fn is_skipped_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && self
                .config
                .skip_dir_names
                .iter()
                .any(|name| entry.file_name() == name.as_str())
    }

    fn process_entry(&self, entry: &DirEntry) -> Option<Result<FileEntry, ScanError>> {
        if !entry.file_type().is_file() {
            return None;
        }

        let path = entry.path();
        if self
            .config
            .exclude_file_names
            .iter()
            .any(|name| entry.file_name() == name.as_str())
        {
            log::trace!("Excluded file: {}", path.display());
            return None;
        }
        if !is_media_file(path) {
            log::trace!("Skipping non-media file: {}", path.display());
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Cannot read metadata for {}: {}", path.display(), e);
                return Some(Err(ScanError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                }));
            }
        };

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(Ok(FileEntry::new(
            path.to_path_buf(),
            metadata.len(),
            modified,
        )))
    }
}

/// Collect multimedia files below each root, in root order.
///
/// Missing roots are logged and contribute nothing. When the shutdown
/// flag is raised, the files found so far are returned.
///
/// # Example
///
/// ```no_run
/// use mediavault::scanner::collect_files;
/// use std::path::PathBuf;
///
/// let files = collect_files(&[PathBuf::from("/camera"), PathBuf::from("/phone")], true, None);
/// println!("{} media files", files.len());
/// ```
#[must_use]
pub fn collect_files(
    roots: &[PathBuf],
    recurse: bool,
    shutdown_flag: Option<Arc<AtomicBool>>,
) -> Vec<PathBuf> {
    let config = WalkerConfig::default().with_recurse(recurse);
    let mut files = Vec::new();

    for root in roots {
        if shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            break;
        }
        if !root.exists() {
            log::warn!("Skipping missing root: {}", root.display());
            continue;
        }

        let mut walker = Walker::new(root, config.clone());
        if let Some(flag) = &shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        let before = files.len();
        files.extend(walker.collect_entries().into_iter().map(|e| e.path));
        log::debug!(
            "Collected {} files from {}",
            files.len() - before,
            root.display()
        );
    }

    files
}
