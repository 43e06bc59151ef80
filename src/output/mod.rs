//! Machine-readable renderers for command reports.
//!
//! - JSON for automation and scripting (every command)
//! - CSV for spreadsheet review of duplicate pairings
//!
//! # Example
//!
//! ```no_run
//! use mediavault::cache::HashStore;
//! use mediavault::error::ExitCode;
//! use mediavault::output::json::{JsonOutput, JsonReconcile};
//! use mediavault::scanner::batch::BatchConfig;
//! use std::path::Path;
//!
//! let mut store = HashStore::open(Path::new("/archive")).unwrap();
//! let outcome = store.reconcile(&BatchConfig::default()).unwrap();
//! let output = JsonOutput::new("reconcile", JsonReconcile::from(outcome.value()), ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod csv;
pub mod json;

// Re-export main types
pub use csv::{CsvOutput, CsvOutputError};
pub use json::{JsonOutput, JsonOutputError};
