//! Structured error handling and exit codes.

use serde::Serialize;

use crate::operation::Outcome;

/// Exit codes for the mediavault binary.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: Nothing to do (no changes, no new files)
/// - 3: Partial success (some files could not be processed)
/// - 130: Interrupted by user (Ctrl+C or timeout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The operation completed and did work.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The operation completed with nothing to do.
    NothingToDo = 2,
    /// The operation completed but some files failed.
    PartialSuccess = 3,
    /// The operation was cancelled.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "MV000",
            Self::GeneralError => "MV001",
            Self::NothingToDo => "MV002",
            Self::PartialSuccess => "MV003",
            Self::Interrupted => "MV130",
        }
    }

    /// Exit code for a finished operation.
    ///
    /// Cancellation wins over failures, failures over "nothing to do".
    #[must_use]
    pub fn for_outcome<T>(outcome: &Outcome<T>, failures: usize, did_work: bool) -> Self {
        if outcome.is_cancelled() {
            Self::Interrupted
        } else if failures > 0 {
            Self::PartialSuccess
        } else if did_work {
            Self::Success
        } else {
            Self::NothingToDo
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "MV001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Context chain, outermost first
    pub causes: Vec<String>,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
