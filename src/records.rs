//! Per-file status and selection, kept apart from immutable records.
//!
//! [`FileRecord`](crate::scanner::FileRecord)s never change after hashing.
//! What a user or a backup run does with them (select, copy, fail) is
//! tracked here, keyed by path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Lifecycle of a file within one backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Not yet processed
    Pending,
    /// Being copied
    InProgress,
    /// Copied into the archive
    Completed,
    /// Hashing or copying failed
    Error,
    /// Already present in the archive or earlier in the source
    Duplicate,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct RecordState {
    status: RecordStatus,
    selected: bool,
}

/// Status board for a set of files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordStates {
    states: BTreeMap<PathBuf, RecordState>,
}

impl RecordStates {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file. New files are selected, everything else is not.
    pub fn insert(&mut self, path: PathBuf, status: RecordStatus) {
        let selected = status == RecordStatus::Pending;
        self.states.insert(path, RecordState { status, selected });
    }

    /// Current status of a file.
    #[must_use]
    pub fn status(&self, path: &Path) -> Option<RecordStatus> {
        self.states.get(path).map(|s| s.status)
    }

    /// Update the status of a known file. Returns `false` if unknown.
    pub fn set_status(&mut self, path: &Path, status: RecordStatus) -> bool {
        match self.states.get_mut(path) {
            Some(state) => {
                state.status = status;
                true
            }
            None => false,
        }
    }

    /// Whether a file is selected for backup.
    #[must_use]
    pub fn is_selected(&self, path: &Path) -> bool {
        self.states.get(path).is_some_and(|s| s.selected)
    }

    /// Select or deselect a known file. Returns `false` if unknown.
    pub fn select(&mut self, path: &Path, selected: bool) -> bool {
        match self.states.get_mut(path) {
            Some(state) => {
                state.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Selected paths in path order.
    #[must_use]
    pub fn selected(&self) -> Vec<&Path> {
        self.states
            .iter()
            .filter(|(_, s)| s.selected)
            .map(|(p, _)| p.as_path())
            .collect()
    }

    /// Number of files with the given status.
    #[must_use]
    pub fn count(&self, status: RecordStatus) -> usize {
        self.states.values().filter(|s| s.status == status).count()
    }

    /// Number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no file is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
