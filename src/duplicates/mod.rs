//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Classifying source files as new, already archived or repeated
//! - Pairing archived duplicates with their master copies
//! - Grouping every path that shares a content identity

pub mod finder;
pub mod groups;

use std::path::PathBuf;

pub use finder::{DetectionReport, DetectorConfig, DuplicateDetector};
pub use groups::{group_by_hash, DuplicateGroup, DuplicatePairing, SourceDuplicate};

/// Errors raised before detection starts.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    /// No source root was given.
    #[error("No source directories given")]
    NoSources,

    /// A source root does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    /// A source root is not a directory.
    #[error("Source is not a directory: {0}")]
    NotADirectory(PathBuf),
}
