//! Persistent hash store for one archive root.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use super::entry::{ArchiveIndex, HashIndexEntry, RawEntry};
use super::StoreError;
use crate::operation::Outcome;
use crate::progress::phase;
use crate::scanner::batch::{completion_message, hash_files, throughput_mb_s, BatchConfig};
use crate::scanner::path_utils::relative_key;
use crate::scanner::{ContentHash, FileEntry, Hasher, ScanError, Walker, WalkerConfig};
use crate::sync::DEFAULT_TEMP_DIR_NAME;

/// Name of the index file kept in the archive root.
pub const STORE_FILE_NAME: &str = ".mediavault-index.json";

/// Changes found by one reconciliation pass.
///
/// The three maps are disjoint and keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    new_files: BTreeMap<String, ContentHash>,
    modified_files: BTreeMap<String, ContentHash>,
    deleted_files: BTreeMap<String, ContentHash>,
    files_scanned: usize,
    files_hashed: usize,
    hash_errors: usize,
    bytes_hashed: u64,
    processing_time: Duration,
}

impl ValidationResult {
    /// Files not previously indexed.
    #[must_use]
    pub fn new_files(&self) -> &BTreeMap<String, ContentHash> {
        &self.new_files
    }

    /// Indexed files whose identity changed, with the new identity.
    #[must_use]
    pub fn modified_files(&self) -> &BTreeMap<String, ContentHash> {
        &self.modified_files
    }

    /// Indexed files no longer on disk, with their last identity.
    #[must_use]
    pub fn deleted_files(&self) -> &BTreeMap<String, ContentHash> {
        &self.deleted_files
    }

    /// Live multimedia files found in the archive.
    #[must_use]
    pub fn files_scanned(&self) -> usize {
        self.files_scanned
    }

    /// Files that were (re)hashed in this pass.
    #[must_use]
    pub fn files_hashed(&self) -> usize {
        self.files_hashed
    }

    /// Files that could not be hashed and kept their previous state.
    #[must_use]
    pub fn hash_errors(&self) -> usize {
        self.hash_errors
    }

    /// Bytes read while hashing.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Wall time of the pass.
    #[must_use]
    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    /// Hashing throughput in MB/s.
    #[must_use]
    pub fn throughput_mb_s(&self) -> f64 {
        throughput_mb_s(self.bytes_hashed, self.processing_time)
    }

    /// Whether anything was added, changed or removed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !(self.new_files.is_empty()
            && self.modified_files.is_empty()
            && self.deleted_files.is_empty())
    }

    /// Human-readable timing summary.
    #[must_use]
    pub fn completion_message(&self) -> String {
        completion_message(self.processing_time, self.throughput_mb_s())
    }
}

/// Relative path → identity index of one archive root, persisted as JSON.
///
/// Passes take `&mut self`, so one store value can run only one pass at a
/// time. Two stores over the same root in different processes are not
/// coordinated.
///
/// # Example
///
/// ```no_run
/// use mediavault::cache::HashStore;
/// use mediavault::scanner::batch::BatchConfig;
/// use std::path::Path;
///
/// let mut store = HashStore::open(Path::new("/archive")).unwrap();
/// let outcome = store.reconcile(&BatchConfig::default()).unwrap();
/// let result = outcome.value();
/// println!("{} new, {} deleted", result.new_files().len(), result.deleted_files().len());
/// ```
#[derive(Debug)]
pub struct HashStore {
    root: PathBuf,
    entries: BTreeMap<String, HashIndexEntry>,
    hasher: Hasher,
}

impl HashStore {
    /// Open the store of an archive root, loading any existing index.
    ///
    /// A missing index file means an empty index. An unparseable one is
    /// logged and also treated as empty; it is replaced on the next save.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the root is missing or not a directory, or
    /// if an existing index file cannot be read.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        check_root(root)?;
        let mut store = Self {
            root: root.to_path_buf(),
            entries: BTreeMap::new(),
            hasher: Hasher::new(),
        };
        store.entries = store.load()?;
        log::debug!(
            "Opened hash store at {} with {} entries",
            store.store_path().display(),
            store.entries.len()
        );
        Ok(store)
    }

    /// Use a hasher with custom sampling parameters.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the index file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE_NAME)
    }

    /// Entry for a relative path.
    #[must_use]
    pub fn get(&self, relative_path: &str) -> Option<&HashIndexEntry> {
        self.entries.get(relative_path)
    }

    /// All entries, sorted by relative path.
    pub fn entries(&self) -> impl Iterator<Item = &HashIndexEntry> {
        self.entries.values()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identity lookup over the current in-memory index.
    #[must_use]
    pub fn snapshot(&self) -> ArchiveIndex {
        ArchiveIndex::from_entries(&self.root, self.entries.values().cloned())
    }

    /// Bring the index in line with the archive on disk.
    ///
    /// Only files that are unknown or whose size or modification time
    /// changed are rehashed. Index entries without a live file are removed.
    /// The updated index is written to disk when the pass completes.
    ///
    /// On cancellation no deletions are applied and nothing is written;
    /// the partial result is returned as [`Outcome::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the root vanished or the index cannot be
    /// written.
    pub fn reconcile(&mut self, config: &BatchConfig) -> Result<Outcome<ValidationResult>, StoreError> {
        self.run_pass(config)
    }

    /// Rebuild the index from scratch: the stored entries are discarded
    /// and every archive file is rehashed and reported as new.
    ///
    /// If the pass is cancelled or fails, the previous in-memory index is
    /// restored and the file on disk is left untouched.
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile).
    pub fn force_rehash(
        &mut self,
        config: &BatchConfig,
    ) -> Result<Outcome<ValidationResult>, StoreError> {
        let previous = std::mem::take(&mut self.entries);
        let result = self.run_pass(config);
        if !matches!(result, Ok(Outcome::Completed(_))) {
            log::info!("Full rehash did not complete, restoring previous index");
            self.entries = previous;
        }
        result
    }

    /// Write the index atomically (temporary file in the root, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O or serialization failure.
    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.store_path();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let temp = NamedTempFile::new_in(&self.root).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &self.entries)?;
            writer.write_all(b"\n").map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;

        log::debug!("Saved {} index entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<String, HashIndexEntry>, StoreError> {
        let path = self.store_path();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!(
                    "Index file {} is corrupted ({}), starting with an empty index",
                    path.display(),
                    e
                );
                return Ok(BTreeMap::new());
            }
        };

        let mut entries = BTreeMap::new();
        let mut invalid = 0usize;
        for (key, value) in raw {
            let validated = serde_json::from_value::<RawEntry>(value)
                .map_err(|_| "malformed entry")
                .and_then(RawEntry::validate);
            match validated {
                Ok(entry) => {
                    entries.insert(entry.relative_path.clone(), entry);
                }
                Err(reason) => {
                    log::debug!("Discarding index entry {:?}: {}", key, reason);
                    invalid += 1;
                }
            }
        }
        if invalid > 0 {
            log::warn!(
                "Discarded {} invalid entries from {}",
                invalid,
                path.display()
            );
        }
        Ok(entries)
    }

    /// Walk the archive, returning live files by key and the keys of
    /// subtrees that could not be read.
    fn scan_live(&self, config: &BatchConfig) -> Result<LiveScan, StoreError> {
        let mut walker = Walker::new(
            &self.root,
            WalkerConfig::default()
                .exclude_file(STORE_FILE_NAME)
                .skip_dir(DEFAULT_TEMP_DIR_NAME),
        );
        if let Some(ref flag) = config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }

        let mut scan = LiveScan::default();
        for item in walker.walk() {
            match item {
                Ok(entry) => {
                    if let Some(key) = relative_key(&self.root, &entry.path) {
                        scan.files.insert(key, entry);
                    }
                }
                Err(ScanError::Io { path, source }) => match relative_key(&self.root, &path) {
                    Some(key) => {
                        log::warn!(
                            "Keeping index entries under unreadable {}: {}",
                            path.display(),
                            source
                        );
                        scan.unreadable.push(key);
                    }
                    None => return Err(StoreError::Io { path, source }),
                },
                Err(e) => {
                    return Err(StoreError::Io {
                        path: self.root.clone(),
                        source: std::io::Error::other(e.to_string()),
                    })
                }
            }
        }
        Ok(scan)
    }

    fn run_pass(&mut self, config: &BatchConfig) -> Result<Outcome<ValidationResult>, StoreError> {
        check_root(&self.root)?;
        let start = Instant::now();
        let mut result = ValidationResult::default();

        if let Some(ref callback) = config.progress_callback {
            callback.on_phase_start(phase::COLLECT, 0);
        }
        let scan = self.scan_live(config);
        if let Some(ref callback) = config.progress_callback {
            callback.on_phase_end(phase::COLLECT);
        }
        let LiveScan { files: live, unreadable } = scan?;
        result.files_scanned = live.len();

        if config.is_shutdown_requested() {
            result.processing_time = start.elapsed();
            return Ok(Outcome::Cancelled(result));
        }

        let stale: Vec<&String> = live
            .iter()
            .filter(|(key, file)| {
                self.entries
                    .get(key.as_str())
                    .map_or(true, |e| !e.fingerprint_matches(file.modified, file.size))
            })
            .map(|(key, _)| key)
            .collect();
        log::info!(
            "Archive {}: {} files, {} to hash",
            self.root.display(),
            live.len(),
            stale.len()
        );

        let paths: Vec<PathBuf> = stale.iter().map(|key| live[key.as_str()].path.clone()).collect();
        let report = hash_files(&paths, &self.hasher, config);
        result.files_hashed = report.hashes().len();
        result.hash_errors = report.errors().len();
        result.bytes_hashed = report.bytes_hashed();

        for key in stale {
            let file = &live[key.as_str()];
            let Some(&hash) = report.hashes().get(&file.path) else {
                continue;
            };
            let fresh = HashIndexEntry::new(key.clone(), hash, file.modified, file.size);

            match self.entries.get(key.as_str()).map(|e| e.hash) {
                None => {
                    result.new_files.insert(key.clone(), hash);
                }
                Some(old) if old != hash => {
                    log::debug!("Modified: {} ({} -> {})", key, old, hash);
                    result.modified_files.insert(key.clone(), hash);
                }
                Some(_) => log::trace!("Fingerprint refreshed: {}", key),
            }
            self.entries.insert(key.clone(), fresh);
        }

        if report.interrupted() || config.is_shutdown_requested() {
            result.processing_time = start.elapsed();
            log::info!("Reconciliation cancelled; index not saved");
            return Ok(Outcome::Cancelled(result));
        }

        let live_keys: BTreeSet<&str> = live.keys().map(String::as_str).collect();
        let gone: Vec<String> = self
            .entries
            .keys()
            .filter(|key| !live_keys.contains(key.as_str()))
            .filter(|key| !unreadable.iter().any(|prefix| is_under(key, prefix)))
            .cloned()
            .collect();
        for key in gone {
            if let Some(entry) = self.entries.remove(&key) {
                result.deleted_files.insert(key, entry.hash);
            }
        }

        self.save()?;
        result.processing_time = start.elapsed();
        log::info!(
            "Reconciled: {} new, {} modified, {} deleted. {}",
            result.new_files.len(),
            result.modified_files.len(),
            result.deleted_files.len(),
            result.completion_message()
        );
        Ok(Outcome::Completed(result))
    }
}

/// Result of walking the archive root.
#[derive(Debug, Default)]
struct LiveScan {
    files: BTreeMap<String, FileEntry>,
    unreadable: Vec<String>,
}

/// Whether `key` is `prefix` itself or lies below it.
fn is_under(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// The root must be a directory whose listing can be read.
fn check_root(root: &Path) -> Result<(), StoreError> {
    match fs::metadata(root) {
        Ok(m) if m.is_dir() => {
            fs::read_dir(root)
                .map(|_| ())
                .map_err(|source| StoreError::Io {
                    path: root.to_path_buf(),
                    source,
                })
        }
        Ok(_) => Err(StoreError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StoreError::RootNotFound(root.to_path_buf()))
        }
        Err(source) => Err(StoreError::Io {
            path: root.to_path_buf(),
            source,
        }),
    }
}
