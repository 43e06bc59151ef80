//! Duplicate groups and pairings produced by detection.
//!
//! # Overview
//!
//! Detection classifies each hashed source file once. The types here
//! describe the relationships between files that share an identity:
//!
//! - [`DuplicatePairing`]: a source file already present in the archive,
//!   with every archive copy and every other source copy.
//! - [`SourceDuplicate`]: a source file that repeats an earlier source file
//!   and is not in the archive.
//! - [`DuplicateGroup`]: all paths sharing one identity, split into
//!   "in master" and "only in source".

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::cache::ArchiveIndex;
use crate::scanner::{ContentHash, FileRecord};

/// A source file whose content already exists in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePairing {
    /// The source file
    pub file: PathBuf,
    /// Shared content identity
    pub hash: ContentHash,
    /// Absolute paths of the archive copies
    pub master_copies: Vec<PathBuf>,
    /// Other source files with the same identity
    pub other_source_copies: Vec<PathBuf>,
}

/// A source file repeating an earlier source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDuplicate {
    /// The repeated file
    pub record: FileRecord,
    /// First file in collection order with the same identity
    pub first_occurrence: PathBuf,
}

/// Every path sharing one content identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Shared content identity
    pub hash: ContentHash,
    /// Size of the first file seen with this identity
    pub size: u64,
    /// Archive copies (absolute paths)
    pub in_master: Vec<PathBuf>,
    /// Source copies, in collection order
    pub in_source: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Total number of copies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_master.len() + self.in_source.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the archive already holds this content.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        !self.in_master.is_empty()
    }

    /// Bytes that copying every source copy would waste.
    #[must_use]
    pub fn redundant_bytes(&self) -> u64 {
        let redundant = if self.is_archived() {
            self.in_source.len()
        } else {
            self.in_source.len().saturating_sub(1)
        };
        self.size * redundant as u64
    }
}

/// Build groups for every identity that occurs more than once across the
/// archive and the given source records.
///
/// Groups are ordered by the first source occurrence of their identity.
#[must_use]
pub fn group_by_hash<'a, I>(records: I, index: &ArchiveIndex) -> Vec<DuplicateGroup>
where
    I: IntoIterator<Item = &'a FileRecord>,
{
    let mut order: Vec<ContentHash> = Vec::new();
    let mut by_hash: BTreeMap<ContentHash, DuplicateGroup> = BTreeMap::new();

    for record in records {
        let group = by_hash.entry(record.hash()).or_insert_with(|| {
            order.push(record.hash());
            DuplicateGroup {
                hash: record.hash(),
                size: record.size(),
                in_master: index.absolute_paths_for(&record.hash()),
                in_source: Vec::new(),
            }
        });
        group.in_source.push(record.path().to_path_buf());
    }

    order
        .into_iter()
        .filter_map(|hash| by_hash.remove(&hash))
        .filter(|group| group.len() > 1)
        .collect()
}
