//! File actions module.
//!
//! This module provides the copy step of a backup run:
//! - Proactive free-space check per file
//! - Collision-safe naming inside the archive
//! - Status updates on the record board
//!
//! ```no_run
//! use mediavault::actions::backup::{backup_files, BackupConfig};
//! use mediavault::records::RecordStates;
//! use std::path::Path;
//!
//! let mut states = RecordStates::new();
//! let outcome = backup_files(&[], &mut states, Path::new("/archive"), "import", &BackupConfig::default());
//! ```

pub mod backup;

// Re-export commonly used types
pub use backup::{
    backup_files, unique_destination, BackupConfig, BackupError, BackupReport, CopiedFile,
    SpaceProbe, SystemSpaceProbe,
};
