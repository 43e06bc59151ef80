//! Background operations with a progress event stream.
//!
//! [`spawn`] runs a unit of work on its own thread and returns an
//! [`OperationHandle`]. The handle yields [`OperationEvent`]s through a
//! `crossbeam-channel` receiver: any number of progress events, then
//! exactly one [`OperationEvent::Finished`] carrying the terminal result.
//!
//! Cancellation is cooperative. [`OperationHandle::cancel`] raises the
//! shutdown flag handed to the work closure; the work decides where to stop
//! and reports partial results as [`Outcome::Cancelled`].
//!
//! # Example
//!
//! ```
//! use mediavault::operation::{spawn, Outcome};
//!
//! let handle = spawn("count", |ctx| {
//!     ctx.progress().on_message("counting");
//!     Ok(Outcome::Completed(42))
//! })
//! .unwrap();
//!
//! assert_eq!(handle.wait().unwrap(), Outcome::Completed(42));
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::progress::{ProgressCallback, ProgressUpdate};

/// Result of an operation that may have been cancelled.
///
/// Cancellation is not a failure: both variants carry a value, the partial
/// one for `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran to completion.
    Completed(T),
    /// The operation observed the shutdown flag and stopped early.
    Cancelled(T),
}

impl<T> Outcome<T> {
    /// Whether the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Borrow the carried value.
    #[must_use]
    pub fn value(&self) -> &T {
        match self {
            Self::Completed(v) | Self::Cancelled(v) => v,
        }
    }

    /// Take the carried value, complete or partial.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Completed(v) | Self::Cancelled(v) => v,
        }
    }

    /// Map the carried value, keeping the variant.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(v) => Outcome::Completed(f(v)),
            Self::Cancelled(v) => Outcome::Cancelled(f(v)),
        }
    }

    /// Build `Cancelled` when `cancelled` is set, `Completed` otherwise.
    #[must_use]
    pub fn from_flag(cancelled: bool, value: T) -> Self {
        if cancelled {
            Self::Cancelled(value)
        } else {
            Self::Completed(value)
        }
    }
}

/// Progress reported by a running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A phase started with `total` items.
    PhaseStarted {
        /// Phase name
        phase: String,
        /// Items in the phase
        total: usize,
    },
    /// Periodic progress within the current phase.
    Update(ProgressUpdate),
    /// A phase finished.
    PhaseEnded {
        /// Phase name
        phase: String,
    },
    /// Free-form status line.
    Message(String),
}

impl ProgressEvent {
    /// Replay this event on another callback, e.g. a terminal reporter.
    pub fn dispatch(&self, target: &dyn ProgressCallback) {
        match self {
            Self::PhaseStarted { phase, total } => target.on_phase_start(phase, *total),
            Self::Update(update) => target.on_progress(update),
            Self::PhaseEnded { phase } => target.on_phase_end(phase),
            Self::Message(message) => target.on_message(message),
        }
    }
}

/// Event stream item of an [`OperationHandle`].
#[derive(Debug)]
pub enum OperationEvent<T> {
    /// Intermediate progress.
    Progress(ProgressEvent),
    /// Terminal result; always the last event.
    Finished(anyhow::Result<Outcome<T>>),
}

/// [`ProgressCallback`] that forwards into the operation's channel.
struct ChannelReporter<T> {
    sender: Sender<OperationEvent<T>>,
}

impl<T: Send> ChannelReporter<T> {
    fn send(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.sender.send(OperationEvent::Progress(event));
    }
}

impl<T: Send> ProgressCallback for ChannelReporter<T> {
    fn on_phase_start(&self, phase: &str, total: usize) {
        self.send(ProgressEvent::PhaseStarted {
            phase: phase.to_string(),
            total,
        });
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        self.send(ProgressEvent::Update(update.clone()));
    }

    fn on_phase_end(&self, phase: &str) {
        self.send(ProgressEvent::PhaseEnded {
            phase: phase.to_string(),
        });
    }

    fn on_message(&self, message: &str) {
        self.send(ProgressEvent::Message(message.to_string()));
    }
}

/// What the work closure receives: a progress sink and the shutdown flag.
#[derive(Clone)]
pub struct OperationContext {
    progress: Arc<dyn ProgressCallback>,
    shutdown_flag: Arc<AtomicBool>,
}

impl OperationContext {
    /// Progress sink forwarding to the handle's event stream.
    #[must_use]
    pub fn progress(&self) -> Arc<dyn ProgressCallback> {
        Arc::clone(&self.progress)
    }

    /// Shutdown flag raised by [`OperationHandle::cancel`].
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }
}

/// Handle to a running background operation.
pub struct OperationHandle<T> {
    name: String,
    events: Receiver<OperationEvent<T>>,
    shutdown_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<T> std::fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("name", &self.name)
            .field("cancelled", &self.shutdown_flag.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<T> OperationHandle<T> {
    /// Operation name (also the worker thread name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver of progress events followed by the terminal result.
    #[must_use]
    pub fn events(&self) -> &Receiver<OperationEvent<T>> {
        &self.events
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        log::debug!("Cancellation requested for operation '{}'", self.name);
        self.shutdown_flag.store(true, Ordering::SeqCst);
    }

    /// Drain events until the terminal result and return it.
    ///
    /// # Errors
    ///
    /// Returns the work's own error, or an error if the worker died
    /// without reporting.
    pub fn wait(self) -> anyhow::Result<Outcome<T>> {
        self.wait_with(|_| {})
    }

    /// Like [`wait`](Self::wait), passing every progress event to `on_event`.
    ///
    /// # Errors
    ///
    /// See [`wait`](Self::wait).
    pub fn wait_with(mut self, mut on_event: impl FnMut(&ProgressEvent)) -> anyhow::Result<Outcome<T>> {
        let mut result = None;
        for event in &self.events {
            match event {
                OperationEvent::Progress(progress) => on_event(&progress),
                OperationEvent::Finished(finished) => {
                    result = Some(finished);
                    break;
                }
            }
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result.unwrap_or_else(|| Err(anyhow!("operation '{}' ended without a result", self.name)))
    }
}

/// Run `work` on a background thread with a fresh shutdown flag.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn<T, F>(name: &str, work: F) -> std::io::Result<OperationHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(OperationContext) -> anyhow::Result<Outcome<T>> + Send + 'static,
{
    spawn_with_flag(name, Arc::new(AtomicBool::new(false)), work)
}

/// Run `work` on a background thread sharing an existing shutdown flag.
///
/// Use this to tie an operation to a process-wide Ctrl+C flag.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_with_flag<T, F>(
    name: &str,
    shutdown_flag: Arc<AtomicBool>,
    work: F,
) -> std::io::Result<OperationHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(OperationContext) -> anyhow::Result<Outcome<T>> + Send + 'static,
{
    let (sender, receiver) = unbounded();
    let context = OperationContext {
        progress: Arc::new(ChannelReporter {
            sender: sender.clone(),
        }),
        shutdown_flag: Arc::clone(&shutdown_flag),
    };
    let thread_name = name.to_string();

    let thread = thread::Builder::new()
        .name(format!("mediavault-{name}"))
        .spawn(move || {
            log::debug!("Operation '{}' started", thread_name);
            let result = catch_unwind(AssertUnwindSafe(|| work(context)))
                .unwrap_or_else(|_| Err(anyhow!("operation '{thread_name}' panicked")));
            log::debug!("Operation '{}' finished", thread_name);
            let _ = sender.send(OperationEvent::Finished(result));
        })?;

    Ok(OperationHandle {
        name: name.to_string(),
        events: receiver,
        shutdown_flag,
        thread: Some(thread),
    })
}
