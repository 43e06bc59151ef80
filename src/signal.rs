//! Cancellation plumbing: Ctrl+C handling and timeouts.
//!
//! Every long operation polls an `Arc<AtomicBool>`. This module owns the
//! ways that flag gets set from outside the operation:
//!
//! - [`install_handler`] sets it on Ctrl+C
//! - [`cancel_after`] sets it when a deadline passes
//!
//! ```rust,no_run
//! use mediavault::signal::{cancel_after, install_handler};
//! use std::time::Duration;
//!
//! let handler = install_handler().unwrap();
//! cancel_after(handler.get_flag(), Duration::from_secs(600)).unwrap();
//! ```

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Exit code for an interrupted run (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with the flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Flag to hand to operation configs.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Errors from cancellation plumbing.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The Ctrl+C handler could not be installed.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),

    /// The timeout thread could not be started.
    #[error("Failed to start timeout thread: {0}")]
    TimerFailed(#[source] io::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C handler.
///
/// The hook can only be registered once per process; later calls get the
/// same handler back with its flag cleared.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if another hook already owns the
/// signal.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "\nInterrupted. Finishing current file...");
        let _ = stderr.flush();
        log::info!("Shutdown signal received");
    })?;

    Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone())
}

/// Set `flag` once `timeout` has elapsed.
///
/// The timer thread exits early if the flag is set by someone else first.
///
/// # Errors
///
/// Returns [`SignalError::TimerFailed`] if the thread cannot be spawned.
pub fn cancel_after(flag: Arc<AtomicBool>, timeout: Duration) -> Result<(), SignalError> {
    let deadline = Instant::now() + timeout;
    thread::Builder::new()
        .name("mediavault-timeout".into())
        .spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= deadline {
                    log::warn!("Timeout of {:?} reached, cancelling", timeout);
                    flag.store(true, Ordering::SeqCst);
                    return;
                }
                thread::sleep((deadline - now).min(Duration::from_millis(100)));
            }
        })
        .map(|_| ())
        .map_err(SignalError::TimerFailed)
}
