//! Parallel content hashing of a file list.
//!
//! # Overview
//!
//! [`hash_files`] spreads a list of paths over a dedicated, explicitly
//! sized rayon pool. Workers share a single atomic cursor: each one claims
//! the next index until the list is exhausted or shutdown is requested, so
//! large and small files balance out without pre-partitioning.
//!
//! Results land in a [`DashMap`] (each path is written once), failures in
//! a shared error list. A file that cannot be read never aborts the batch.
//!
//! # Cancellation
//!
//! Workers check the shutdown flag before claiming work. A file that is
//! already being hashed runs to completion. The returned report is marked
//! `interrupted` and carries whatever was hashed.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::path_utils::display_name;
use super::{ContentHash, HashError, Hasher};
use crate::progress::{phase, ProgressCallback, ProgressUpdate};

/// Number of logical cores, or 1 when it cannot be determined.
#[must_use]
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Configuration for one hashing batch.
#[derive(Clone, Default)]
pub struct BatchConfig {
    /// Worker count; `None` means one per logical core.
    pub threads: Option<usize>,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConfig")
            .field("threads", &self.threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Set the number of worker threads.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Worker count actually used, clamped to `[1, 2 × cores]`.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        let cores = available_cores();
        self.threads.unwrap_or(cores).clamp(1, cores * 2)
    }
}

/// Outcome of a hashing batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    hashes: HashMap<PathBuf, ContentHash>,
    errors: Vec<HashError>,
    total: usize,
    bytes_hashed: u64,
    elapsed: Duration,
    interrupted: bool,
    threads: usize,
}

impl BatchReport {
    /// Successfully hashed files.
    #[must_use]
    pub fn hashes(&self) -> &HashMap<PathBuf, ContentHash> {
        &self.hashes
    }

    /// Consume the report, keeping only the hash map.
    #[must_use]
    pub fn into_hashes(self) -> HashMap<PathBuf, ContentHash> {
        self.hashes
    }

    /// Consume the report into the hash map and the failure list.
    #[must_use]
    pub fn into_parts(self) -> (HashMap<PathBuf, ContentHash>, Vec<HashError>) {
        (self.hashes, self.errors)
    }

    /// Per-file failures, sorted by path.
    #[must_use]
    pub fn errors(&self) -> &[HashError] {
        &self.errors
    }

    /// Number of paths submitted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Bytes actually read from disk.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Wall time of the batch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether shutdown stopped the batch before every file was processed.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Worker threads used.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Throughput in MB/s over bytes actually read.
    #[must_use]
    pub fn throughput_mb_s(&self) -> f64 {
        throughput_mb_s(self.bytes_hashed, self.elapsed)
    }

    /// Human-readable summary, e.g. `Completed in 1.20s (85.3 MB/s)`.
    #[must_use]
    pub fn completion_message(&self) -> String {
        completion_message(self.elapsed, self.throughput_mb_s())
    }
}

pub(crate) fn throughput_mb_s(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        0.0
    } else {
        bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

pub(crate) fn completion_message(elapsed: Duration, mb_s: f64) -> String {
    format!("Completed in {elapsed:.2?} ({mb_s:.1} MB/s)")
}

/// Shared worker state for one batch.
struct BatchState<'a> {
    paths: &'a [PathBuf],
    hasher: &'a Hasher,
    config: &'a BatchConfig,
    next: AtomicUsize,
    completed: AtomicUsize,
    error_count: AtomicUsize,
    bytes: AtomicU64,
    results: DashMap<PathBuf, ContentHash>,
    errors: Mutex<Vec<HashError>>,
    report_every: usize,
}

impl BatchState<'_> {
    fn run_worker(&self) {
        let total = self.paths.len();
        loop {
            if self.config.is_shutdown_requested() {
                log::debug!("Hash worker: Shutdown requested, stopping");
                break;
            }
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            let Some(path) = self.paths.get(index) else {
                break;
            };

            match self.hasher.hash_file(path) {
                Ok(output) => {
                    self.bytes.fetch_add(output.bytes_read, Ordering::Relaxed);
                    self.results.insert(path.clone(), output.hash);
                    log::trace!("Hashed {} -> {}", path.display(), output.hash);
                }
                Err(e) => {
                    log::warn!("Failed to hash {}: {}", path.display(), e);
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    self.errors
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(e);
                }
            }

            let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
            if done % self.report_every == 0 || done == total {
                if let Some(ref callback) = self.config.progress_callback {
                    let update = ProgressUpdate::new(done, total, display_name(path))
                        .with_errors(self.error_count.load(Ordering::Relaxed))
                        .with_bytes(self.bytes.load(Ordering::Relaxed));
                    callback.on_progress(&update);
                }
            }
        }
    }
}

/// Hash every path on a dedicated worker pool.
///
/// # Arguments
///
/// * `paths` - Files to hash
/// * `hasher` - Single-file hasher (thresholds and sampling parameters)
/// * `config` - Worker count, shutdown flag and progress callback
///
/// # Example
///
/// ```no_run
/// use mediavault::scanner::batch::{hash_files, BatchConfig};
/// use mediavault::scanner::Hasher;
/// use std::path::PathBuf;
///
/// let paths = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
/// let report = hash_files(&paths, &Hasher::new(), &BatchConfig::default().with_threads(4));
/// println!("{} hashed, {} failed", report.hashes().len(), report.errors().len());
/// ```
#[must_use]
pub fn hash_files(paths: &[PathBuf], hasher: &Hasher, config: &BatchConfig) -> BatchReport {
    let start = Instant::now();
    let total = paths.len();
    let threads = config.effective_threads();

    log::info!("Hashing {} files with {} threads", total, threads);
    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(phase::HASH, total);
    }

    let state = BatchState {
        paths,
        hasher,
        config,
        next: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
        error_count: AtomicUsize::new(0),
        bytes: AtomicU64::new(0),
        results: DashMap::with_capacity(total),
        errors: Mutex::new(Vec::new()),
        report_every: (total / 1000).max(1),
    };

    if total > 0 {
        let workers = threads.min(total);
        match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mediavault-hash-{i}"))
            .build()
        {
            Ok(pool) => pool.scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|_| state.run_worker());
                }
            }),
            Err(e) => {
                log::warn!("Failed to create hashing thread pool ({e}), hashing inline");
                state.run_worker();
            }
        }
    }

    let completed = state.completed.load(Ordering::SeqCst);
    let mut errors = state
        .errors
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    errors.sort_by(|a, b| a.path().cmp(b.path()));

    let report = BatchReport {
        hashes: state.results.into_iter().collect(),
        errors,
        total,
        bytes_hashed: state.bytes.load(Ordering::SeqCst),
        elapsed: start.elapsed(),
        interrupted: completed < total,
        threads,
    };

    if report.interrupted {
        log::info!("Hashing interrupted after {} of {} files", completed, total);
    } else {
        let message = report.completion_message();
        log::info!(
            "Hashed {} files ({} errors). {}",
            report.hashes.len(),
            report.errors.len(),
            message
        );
        if let Some(ref callback) = config.progress_callback {
            callback.on_message(&message);
        }
    }
    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(phase::HASH);
    }

    report
}
