//! CSV export of duplicate pairings.
//!
//! One row per (source file, archive copy) pair, so a spreadsheet can
//! filter on either side.
//!
//! # Columns
//!
//! - `file`: source file already present in the archive
//! - `hash`: shared content identity (16 hex digits)
//! - `master_copy`: one archive copy of the content
//! - `other_source_copies`: other source files with the same content,
//!   separated by `;`
//! - `modified`: source file modification time (RFC 3339)

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::duplicates::DuplicatePairing;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct PairingRow {
    file: String,
    hash: String,
    master_copy: String,
    other_source_copies: String,
    modified: String,
}

/// CSV formatter for [`DuplicatePairing`]s.
pub struct CsvOutput<'a> {
    pairings: &'a [DuplicatePairing],
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(pairings: &'a [DuplicatePairing]) -> Self {
        Self { pairings }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for pairing in self.pairings {
            let others = pairing
                .other_source_copies
                .iter()
                .map(|p| p.to_string_lossy())
                .collect::<Vec<_>>()
                .join(";");
            let modified = modified_rfc3339(&pairing.file);

            for master in &pairing.master_copies {
                csv_writer.serialize(PairingRow {
                    file: pairing.file.to_string_lossy().into_owned(),
                    hash: pairing.hash.to_hex(),
                    master_copy: master.to_string_lossy().into_owned(),
                    other_source_copies: others.clone(),
                    modified: modified.clone(),
                })?;
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Modification time of `path`, or "unknown".
fn modified_rfc3339(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|m| DateTime::<Utc>::from(m).to_rfc3339())
        .unwrap_or_else(|_| "unknown".to_string())
}
