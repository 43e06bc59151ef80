//! mediavault: multimedia backup core.
//!
//! Keeps a content-hash index of an archive directory, finds which files
//! from source folders are not archived yet, copies them in, and mirrors the
//! archive onto backup targets.
//!
//! - [`scanner`]: file collection and xxh3 content hashing
//! - [`cache`]: the persisted archive index and its reconciliation
//! - [`duplicates`]: classification of source files against the archive
//! - [`sync`]: one-way mirroring of the archive
//! - [`actions`]: copying new files into the archive
//! - [`operation`]: background runs with an event channel

pub mod actions;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod operation;
pub mod output;
pub mod progress;
pub mod records;
pub mod scanner;
pub mod signal;
pub mod sync;

pub use commands::run_app;
pub use operation::Outcome;
