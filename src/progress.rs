//! Progress reporting utilities using indicatif.
//!
//! Long operations (hashing, sync, backup) report through the
//! [`ProgressCallback`] trait. The [`Progress`] struct implements it with
//! terminal progress bars for the CLI; [`crate::operation`] implements it
//! with a channel for background runs.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - ASCII bars only
//! - Slower tick rate for screen reader compatibility

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Well-known phase names passed to [`ProgressCallback::on_phase_start`].
pub mod phase {
    /// Walking source or archive trees
    pub const COLLECT: &str = "collect";
    /// Parallel content hashing
    pub const HASH: &str = "hash";
    /// Mirroring the archive into one target
    pub const SYNC: &str = "sync";
    /// Removing orphans from a target
    pub const CLEANUP: &str = "cleanup";
    /// Copying new files into the archive
    pub const BACKUP: &str = "backup";
}

/// Snapshot of an operation's progress.
///
/// The payload is advisory: consumers must not rely on seeing every
/// intermediate value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Items completed so far
    pub current: usize,
    /// Total items in this phase
    pub total: usize,
    /// Last processed item, usually a file name
    pub message: String,
    /// Errors counted so far
    pub errors: usize,
    /// Bytes processed so far
    pub bytes: u64,
}

impl ProgressUpdate {
    /// Create an update with counts and a message.
    #[must_use]
    pub fn new(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            errors: 0,
            bytes: 0,
        }
    }

    /// Attach an error count.
    #[must_use]
    pub fn with_errors(mut self, errors: usize) -> Self {
        self.errors = errors;
        self
    }

    /// Attach a processed byte count.
    #[must_use]
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    /// Completion ratio in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.current as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Progress callback for long-running operations.
///
/// Implement this trait to receive progress updates from the hasher,
/// sync engine and backup action. Implementations must be cheap; they are
/// called from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (see [`phase`])
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called periodically while items are processed.
    fn on_progress(&self, update: &ProgressUpdate);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called with a free-form status line, e.g. the completion summary.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
///
/// Phases run one after another, so a single active bar is kept.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediavault::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
            accessible,
        }
    }

    /// Check if accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn spinner_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("{msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    fn bar_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.as_ref() {
            f(pb);
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = if phase == phase::COLLECT {
            let pb = ProgressBar::new_spinner();
            pb.set_style(self.spinner_style());
            let tick_rate = if self.accessible { 500 } else { 100 };
            pb.enable_steady_tick(Duration::from_millis(tick_rate));
            pb
        } else {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(self.bar_style());
            pb
        };
        pb.set_message(phase_label(phase));

        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.replace(pb) {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if self.quiet {
            return;
        }
        let message = if update.errors > 0 {
            format!(
                "{} ({} errors)",
                truncate_path(&update.message, 30),
                update.errors
            )
        } else {
            truncate_path(&update.message, 30)
        };
        self.with_bar(|pb| {
            pb.set_length(update.total as u64);
            pb.set_position(update.current as u64);
            pb.set_message(message);
        });
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let taken = self
            .bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pb) = taken {
            pb.finish_with_message(format!("{} complete", phase_label(phase)));
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        let mut shown = false;
        self.with_bar(|pb| {
            pb.println(message);
            shown = true;
        });
        if !shown {
            eprintln!("{message}");
        }
    }
}

fn phase_label(phase: &str) -> String {
    match phase {
        phase::COLLECT => "Collecting files".to_string(),
        phase::HASH => "Hashing".to_string(),
        phase::SYNC => "Mirroring".to_string(),
        phase::CLEANUP => "Cleaning up".to_string(),
        phase::BACKUP => "Backing up".to_string(),
        other => other.to_string(),
    }
}

/// Truncate a path for display in the progress bar.
///
/// Keeps the file name when possible and never splits a character.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name_len = file_name.chars().count();

    if name_len + 4 > max_len {
        let keep = max_len.saturating_sub(3);
        let tail: String = file_name.chars().skip(name_len.saturating_sub(keep)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
