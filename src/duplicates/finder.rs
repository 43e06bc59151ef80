//! Duplicate detection of source trees against the archive index.
//!
//! # Overview
//!
//! Every source file is hashed in one parallel batch, then classified in a
//! single pass in collection order:
//!
//! 1. identity present in the archive index ⇒ **master duplicate**;
//! 2. otherwise, identity already seen in this pass ⇒ **source duplicate**;
//! 3. otherwise ⇒ **new**.
//!
//! Every identity is remembered after classification, so the archive check
//! always wins and only the first source copy of fresh content is new.
//! Files that cannot be hashed are listed separately and belong to none of
//! the three classes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::groups::{group_by_hash, DuplicateGroup, DuplicatePairing, SourceDuplicate};
use super::DetectError;
use crate::cache::ArchiveIndex;
use crate::operation::Outcome;
use crate::progress::{phase, ProgressCallback};
use crate::records::{RecordStates, RecordStatus};
use crate::scanner::batch::{completion_message, hash_files, throughput_mb_s, BatchConfig};
use crate::scanner::{ContentHash, FileEntry, FileRecord, HashError, Hasher, Walker, WalkerConfig};

/// Configuration for the duplicate detector.
#[derive(Clone)]
pub struct DetectorConfig {
    /// Descend into subdirectories of the source roots
    pub recurse: bool,
    /// Hashing worker count; `None` means one per logical core
    pub threads: Option<usize>,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("recurse", &self.recurse)
            .field("threads", &self.threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            recurse: true,
            threads: None,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl DetectorConfig {
    /// Set recursion into source subdirectories.
    #[must_use]
    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Set the number of hashing threads.
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

    fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            threads: self.threads,
            shutdown_flag: self.shutdown_flag.clone(),
            progress_callback: self.progress_callback.clone(),
        }
    }
}

/// Classification of the source files of one detection run.
#[derive(Debug, Default, Serialize)]
pub struct DetectionReport {
    /// Multimedia files collected from the sources
    pub source_files: usize,
    /// Files whose content is not in the archive and not repeated earlier
    pub new_files: Vec<FileRecord>,
    /// Files whose content is already in the archive
    pub master_duplicates: Vec<FileRecord>,
    /// Files repeating an earlier source file
    pub source_duplicates: Vec<SourceDuplicate>,
    /// One pairing per master duplicate
    pub pairings: Vec<DuplicatePairing>,
    /// Identities occurring more than once across archive and sources
    pub groups: Vec<DuplicateGroup>,
    /// Files that could not be hashed
    #[serde(skip)]
    pub failed: Vec<HashError>,
    /// Status and selection board for the classified files
    pub states: RecordStates,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Wall time of the run
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
}

impl DetectionReport {
    /// Number of hashed files (new + master duplicates + source duplicates).
    #[must_use]
    pub fn classified(&self) -> usize {
        self.new_files.len() + self.master_duplicates.len() + self.source_duplicates.len()
    }

    /// Bytes that a backup of the new files would copy.
    #[must_use]
    pub fn new_bytes(&self) -> u64 {
        self.new_files.iter().map(FileRecord::size).sum()
    }

    /// Hashing throughput in MB/s.
    #[must_use]
    pub fn throughput_mb_s(&self) -> f64 {
        throughput_mb_s(self.bytes_hashed, self.duration)
    }

    /// Human-readable timing summary.
    #[must_use]
    pub fn completion_message(&self) -> String {
        completion_message(self.duration, self.throughput_mb_s())
    }
}

fn serialize_duration_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Duplicate detector.
///
/// # Example
///
/// ```no_run
/// use mediavault::cache::HashStore;
/// use mediavault::duplicates::{DetectorConfig, DuplicateDetector};
/// use std::path::{Path, PathBuf};
///
/// let store = HashStore::open(Path::new("/archive")).unwrap();
/// let detector = DuplicateDetector::new(DetectorConfig::default());
/// let outcome = detector
///     .detect(&store.snapshot(), &[PathBuf::from("/sdcard/DCIM")])
///     .unwrap();
/// println!("{} new files", outcome.value().new_files.len());
/// ```
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    config: DetectorConfig,
    hasher: Hasher,
}

impl DuplicateDetector {
    /// Create a new detector with the given configuration.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            hasher: Hasher::new(),
        }
    }

    /// Create a detector with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DetectorConfig::default())
    }

    /// Use a hasher with custom sampling parameters.
    ///
    /// Must match the hasher that built the archive index, or identities
    /// of large files will not line up.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Classify every multimedia file below `sources` against `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError`] when no source is given or a source root is
    /// missing, before any hashing starts.
    pub fn detect(
        &self,
        index: &ArchiveIndex,
        sources: &[PathBuf],
    ) -> Result<Outcome<DetectionReport>, DetectError> {
        let start = Instant::now();
        validate_sources(sources)?;

        log::info!(
            "Detecting duplicates in {} source(s) against {} archive entries",
            sources.len(),
            index.len()
        );

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase::COLLECT, 0);
        }
        let entries = self.collect(sources);
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase::COLLECT);
        }

        if self.config.is_shutdown_requested() {
            let report = DetectionReport {
                source_files: entries.len(),
                duration: start.elapsed(),
                ..Default::default()
            };
            return Ok(Outcome::Cancelled(report));
        }

        let paths: Vec<PathBuf> = entries.iter().map(|e| e.path.clone()).collect();
        let batch = hash_files(&paths, &self.hasher, &self.config.batch_config());
        let interrupted = batch.interrupted();
        let bytes_hashed = batch.bytes_hashed();
        let (mut hashes, failed) = batch.into_parts();

        let mut report = classify(entries, &mut hashes, index);
        report.failed = failed;
        for error in &report.failed {
            report
                .states
                .insert(error.path().to_path_buf(), RecordStatus::Error);
        }
        report.bytes_hashed = bytes_hashed;
        report.duration = start.elapsed();

        log::info!(
            "Detection: {} new, {} already archived, {} repeated in source, {} failed. {}",
            report.new_files.len(),
            report.master_duplicates.len(),
            report.source_duplicates.len(),
            report.failed.len(),
            report.completion_message()
        );

        Ok(Outcome::from_flag(interrupted, report))
    }

    /// Walk every source root in order, dropping repeated paths.
    fn collect(&self, sources: &[PathBuf]) -> Vec<FileEntry> {
        let walker_config = WalkerConfig::default().with_recurse(self.config.recurse);
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut entries = Vec::new();

        for source in sources {
            if self.config.is_shutdown_requested() {
                break;
            }
            let mut walker = Walker::new(source, walker_config.clone());
            if let Some(ref flag) = self.config.shutdown_flag {
                walker = walker.with_shutdown_flag(flag.clone());
            }
            for entry in walker.collect_entries() {
                if seen.insert(entry.path.clone()) {
                    entries.push(entry);
                } else {
                    log::debug!("Skipping path listed twice: {}", entry.path.display());
                }
            }
        }
        entries
    }
}

fn validate_sources(sources: &[PathBuf]) -> Result<(), DetectError> {
    if sources.is_empty() {
        return Err(DetectError::NoSources);
    }
    for source in sources {
        match std::fs::metadata(source) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Err(DetectError::NotADirectory(source.clone())),
            Err(_) => return Err(DetectError::SourceNotFound(source.clone())),
        }
    }
    Ok(())
}

/// Single linear pass over hashed entries in collection order.
fn classify(
    entries: Vec<FileEntry>,
    hashes: &mut HashMap<PathBuf, ContentHash>,
    index: &ArchiveIndex,
) -> DetectionReport {
    let mut report = DetectionReport {
        source_files: entries.len(),
        ..Default::default()
    };
    let mut first_seen: HashMap<ContentHash, PathBuf> = HashMap::new();
    let mut hashed: Vec<FileRecord> = Vec::new();

    for entry in entries {
        let Some(hash) = hashes.remove(&entry.path) else {
            continue;
        };
        let record = FileRecord::new(entry, hash);

        if index.contains(&hash) {
            report
                .states
                .insert(record.path().to_path_buf(), RecordStatus::Duplicate);
            report.master_duplicates.push(record.clone());
        } else if let Some(first) = first_seen.get(&hash) {
            report
                .states
                .insert(record.path().to_path_buf(), RecordStatus::Duplicate);
            report.source_duplicates.push(SourceDuplicate {
                record: record.clone(),
                first_occurrence: first.clone(),
            });
        } else {
            report
                .states
                .insert(record.path().to_path_buf(), RecordStatus::Pending);
            report.new_files.push(record.clone());
        }
        first_seen
            .entry(hash)
            .or_insert_with(|| record.path().to_path_buf());
        hashed.push(record);
    }

    report.pairings = build_pairings(&report.master_duplicates, &hashed, index);
    report.groups = group_by_hash(&hashed, index);
    report
}

fn build_pairings(
    master_duplicates: &[FileRecord],
    hashed: &[FileRecord],
    index: &ArchiveIndex,
) -> Vec<DuplicatePairing> {
    let mut by_hash: HashMap<ContentHash, Vec<&Path>> = HashMap::new();
    for record in hashed {
        by_hash.entry(record.hash()).or_default().push(record.path());
    }

    master_duplicates
        .iter()
        .map(|record| DuplicatePairing {
            file: record.path().to_path_buf(),
            hash: record.hash(),
            master_copies: index.absolute_paths_for(&record.hash()),
            other_source_copies: by_hash
                .get(&record.hash())
                .into_iter()
                .flatten()
                .filter(|p| **p != record.path())
                .map(|p| p.to_path_buf())
                .collect(),
        })
        .collect()
}
