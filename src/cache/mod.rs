//! Persistent archive index.
//!
//! The hash store remembers, for every multimedia file of the master
//! archive, its content identity together with the size and modification
//! time seen when it was hashed. Reconciliation only rehashes files whose
//! fingerprint changed, so repeated passes over a large archive are cheap.
//!
//! # Architecture
//!
//! * [`entry`]: index entry model, on-disk validation and the identity
//!   lookup snapshot ([`ArchiveIndex`]).
//! * [`store`]: the [`HashStore`] itself (load, reconcile, persist).
//!
//! # Change detection
//!
//! A file is rehashed when its path is unknown or its `(mtime, size)`
//! fingerprint differs from the stored one. Content edited in place with
//! the modification time restored is not noticed; use
//! [`HashStore::force_rehash`] for a full rebuild.

pub mod entry;
pub mod store;

use std::path::PathBuf;

pub use entry::{ArchiveIndex, HashIndexEntry};
pub use store::{HashStore, ValidationResult, STORE_FILE_NAME};

/// Errors raised by the hash store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The archive root does not exist.
    #[error("Archive root not found: {0}")]
    RootNotFound(PathBuf),

    /// The archive root is not a directory.
    #[error("Archive root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Reading or writing the index failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The index could not be serialized.
    #[error("Failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}
