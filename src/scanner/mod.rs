//! Scanner module for file collection and content hashing.
//!
//! This module provides functionality for:
//! - Sorted directory walking restricted to multimedia files
//! - Content identity with XXH3 (full read or strided sampling)
//! - Parallel batch hashing on a dedicated worker pool
//! - Relative path keys for the archive index
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Single-file content identity
//! - [`batch`]: Parallel hashing of a file list
//! - [`path_utils`]: Relative key normalization
//!
//! # Example
//!
//! ```no_run
//! use mediavault::scanner::{collect_files, batch::{hash_files, BatchConfig}, Hasher};
//! use std::path::PathBuf;
//!
//! let files = collect_files(&[PathBuf::from("/photos")], true, None);
//! let report = hash_files(&files, &Hasher::new(), &BatchConfig::default());
//! for (path, hash) in report.hashes() {
//!     println!("{hash}  {}", path.display());
//! }
//! ```

pub mod batch;
pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

// Re-export main types
pub use hasher::{ContentHash, Hasher, SAMPLE_BUFFER_SIZE, SAMPLE_CHUNKS, SMALL_FILE_THRESHOLD};
pub use walker::{collect_files, Walker, WalkerConfig};

/// Image extensions accepted by the collector (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif", "raw", "cr2",
    "nef", "arw", "dng",
];

/// Video container extensions accepted by the collector (lowercase).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "flv", "m4v", "3gp", "mts", "m2ts", "webm", "mpg", "mpeg",
];

/// Check whether a path carries a known multimedia extension.
///
/// The comparison is case-insensitive, so `IMG_0001.JPG` matches.
///
/// # Example
///
/// ```
/// use mediavault::scanner::is_media_file;
/// use std::path::Path;
///
/// assert!(is_media_file(Path::new("holiday/IMG_0001.JPG")));
/// assert!(is_media_file(Path::new("clip.mp4")));
/// assert!(!is_media_file(Path::new("notes.txt")));
/// ```
#[must_use]
pub fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// Metadata for a discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// A hashed file produced by a scan or detection run.
///
/// Records are immutable once built. Selection and lifecycle status
/// are tracked separately in [`crate::records::RecordStates`].
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    path: PathBuf,
    hash: ContentHash,
    size: u64,
    #[serde(serialize_with = "serialize_millis")]
    modified: SystemTime,
}

impl FileRecord {
    /// Create a record from a file entry and its computed identity.
    #[must_use]
    pub fn new(entry: FileEntry, hash: ContentHash) -> Self {
        Self {
            path: entry.path,
            hash,
            size: entry.size,
            modified: entry.modified,
        }
    }

    /// Absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content identity.
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time.
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Whether two records share the same content identity.
    ///
    /// Hash collisions are accepted as equivalence; contents are not
    /// compared byte for byte.
    #[must_use]
    pub fn same_content(&self, other: &FileRecord) -> bool {
        self.hash == other.hash
    }
}

fn serialize_millis<S: serde::Serializer>(time: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(path_utils::system_time_to_millis(*time))
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a path.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Io { path: p, .. } => p,
        }
    }
}
