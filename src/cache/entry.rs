//! Archive index entries and the identity lookup snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::scanner::path_utils::{key_to_path, normalize_path_str, system_time_to_millis};
use crate::scanner::ContentHash;

/// One file of the master archive as recorded in the index.
///
/// `(last_modified, file_size)` is only a change trigger: a file whose
/// fingerprint matches is assumed unchanged without reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashIndexEntry {
    /// Path relative to the archive root, `/`-separated, NFC
    pub relative_path: String,
    /// Content identity
    pub hash: ContentHash,
    /// Modification time in epoch milliseconds
    pub last_modified: i64,
    /// Size in bytes
    pub file_size: u64,
}

impl HashIndexEntry {
    /// Create an entry from a live file's metadata.
    #[must_use]
    pub fn new(relative_path: String, hash: ContentHash, modified: SystemTime, size: u64) -> Self {
        Self {
            relative_path,
            hash,
            last_modified: system_time_to_millis(modified),
            file_size: size,
        }
    }

    /// Whether the stored fingerprint still matches a live file.
    #[must_use]
    pub fn fingerprint_matches(&self, modified: SystemTime, size: u64) -> bool {
        self.file_size == size && self.last_modified == system_time_to_millis(modified)
    }
}

/// Loosely typed entry as read from disk, validated before use.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawEntry {
    relative_path: Option<String>,
    hash: Option<String>,
    last_modified: Option<i64>,
    file_size: Option<i64>,
}

impl RawEntry {
    /// Turn a raw entry into a valid one, or say why it was rejected.
    pub(crate) fn validate(self) -> Result<HashIndexEntry, &'static str> {
        let relative_path = self
            .relative_path
            .filter(|p| !p.trim().is_empty())
            .ok_or("empty path")?;
        let hash = self
            .hash
            .filter(|h| !h.trim().is_empty())
            .ok_or("empty hash")?
            .parse::<ContentHash>()
            .map_err(|_| "hash is not hex")?;
        let file_size = self
            .file_size
            .and_then(|s| u64::try_from(s).ok())
            .ok_or("negative or missing size")?;
        let last_modified = self
            .last_modified
            .filter(|&t| t > 0)
            .ok_or("non-positive timestamp")?;

        Ok(HashIndexEntry {
            relative_path: normalize_path_str(&relative_path),
            hash,
            last_modified,
            file_size,
        })
    }
}

/// Read-only identity lookup over the archive index.
///
/// Several archive files can share one identity, so each identity maps to
/// every entry carrying it.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    root: PathBuf,
    by_hash: HashMap<ContentHash, Vec<HashIndexEntry>>,
    len: usize,
}

impl ArchiveIndex {
    /// Build a lookup from index entries.
    #[must_use]
    pub fn from_entries<I>(root: &Path, entries: I) -> Self
    where
        I: IntoIterator<Item = HashIndexEntry>,
    {
        let mut by_hash: HashMap<ContentHash, Vec<HashIndexEntry>> = HashMap::new();
        let mut len = 0;
        for entry in entries {
            by_hash.entry(entry.hash).or_default().push(entry);
            len += 1;
        }
        for group in by_hash.values_mut() {
            group.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        }
        Self {
            root: root.to_path_buf(),
            by_hash,
            len,
        }
    }

    /// An index with no entries, e.g. for a brand-new archive.
    #[must_use]
    pub fn empty(root: &Path) -> Self {
        Self::from_entries(root, std::iter::empty())
    }

    /// Archive root the relative paths resolve against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether any archive file carries this identity.
    #[must_use]
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Every archive entry with this identity, sorted by path.
    #[must_use]
    pub fn entries_for(&self, hash: &ContentHash) -> &[HashIndexEntry] {
        self.by_hash.get(hash).map_or(&[], Vec::as_slice)
    }

    /// Absolute location of an entry.
    #[must_use]
    pub fn absolute_path(&self, entry: &HashIndexEntry) -> PathBuf {
        key_to_path(&self.root, &entry.relative_path)
    }

    /// Absolute locations of every archive copy with this identity.
    #[must_use]
    pub fn absolute_paths_for(&self, hash: &ContentHash) -> Vec<PathBuf> {
        self.entries_for(hash)
            .iter()
            .map(|e| self.absolute_path(e))
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct identities.
    #[must_use]
    pub fn unique_hashes(&self) -> usize {
        self.by_hash.len()
    }
}
