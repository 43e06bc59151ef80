//! XXH3 content identity for single files.
//!
//! # Overview
//!
//! [`Hasher`] computes a 64-bit [`ContentHash`] for a file:
//!
//! - Files below [`SMALL_FILE_THRESHOLD`] are streamed through XXH3-64 in
//!   full.
//! - Larger files are sampled: the file is split into [`SAMPLE_CHUNKS`]
//!   equal chunks and up to [`SAMPLE_BUFFER_SIZE`] bytes are read at the
//!   start of each chunk. Chunk hashes are folded with
//!   `acc = acc.rotate_left(1) ^ chunk_hash`, seeded by chunk 0.
//!
//! Sampling keeps I/O bounded regardless of file size. Two large files that
//! only differ between sampled regions will share an identity; the hash is
//! used to raise duplicate suspicion, not as proof of equality.

use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use twox_hash::XxHash3_64;

use super::HashError;

/// Files at or above this size are hashed by strided sampling (100 MiB).
pub const SMALL_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Number of equal chunks a large file is divided into.
pub const SAMPLE_CHUNKS: u64 = 10;

/// Bytes read at the start of every sampled chunk (10 MiB).
pub const SAMPLE_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Read buffer for streaming small files.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Fixed-width content identity (64-bit XXH3, rendered as 16 hex digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Wrap a raw 64-bit hash value.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Raw 64-bit value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Lowercase, zero-padded hex representation.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Error returned when parsing a hex identity fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash: {0:?}")]
pub struct ParseHashError(String);

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.len() > 16 {
            return Err(ParseHashError(s.to_string()));
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| ParseHashError(s.to_string()))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Result of hashing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOutput {
    /// Computed identity
    pub hash: ContentHash,
    /// Bytes actually read from disk
    pub bytes_read: u64,
    /// Whether strided sampling was used
    pub sampled: bool,
}

/// Content hasher with configurable sampling parameters.
///
/// # Example
///
/// ```no_run
/// use mediavault::scanner::Hasher;
/// use std::path::Path;
///
/// let hasher = Hasher::new();
/// let output = hasher.hash_file(Path::new("clip.mp4")).unwrap();
/// println!("{} ({} bytes read)", output.hash, output.bytes_read);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hasher {
    small_file_threshold: u64,
    sample_chunks: u64,
    sample_buffer_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            small_file_threshold: SMALL_FILE_THRESHOLD,
            sample_chunks: SAMPLE_CHUNKS,
            sample_buffer_size: SAMPLE_BUFFER_SIZE,
        }
    }

    /// Set the size at which sampling replaces full reads.
    #[must_use]
    pub fn with_small_file_threshold(mut self, bytes: u64) -> Self {
        self.small_file_threshold = bytes.max(1);
        self
    }

    /// Set the number of sampled chunks.
    #[must_use]
    pub fn with_sample_chunks(mut self, chunks: u64) -> Self {
        self.sample_chunks = chunks.max(1);
        self
    }

    /// Set the number of bytes read per sampled chunk.
    #[must_use]
    pub fn with_sample_buffer_size(mut self, bytes: usize) -> Self {
        self.sample_buffer_size = bytes.max(1);
        self
    }

    /// Size at which sampling kicks in.
    #[must_use]
    pub fn small_file_threshold(&self) -> u64 {
        self.small_file_threshold
    }

    /// Hash a file, choosing full read or sampling by its size.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn hash_file(&self, path: &Path) -> Result<HashOutput, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();

        let result = if size < self.small_file_threshold {
            stream_hash(&mut file).map(|(hash, bytes_read)| HashOutput {
                hash,
                bytes_read,
                sampled: false,
            })
        } else {
            log::debug!(
                "Sampling large file ({} MB): {}",
                size / (1024 * 1024),
                path.display()
            );
            self.sample_hash(&mut file, size)
                .map(|(hash, bytes_read)| HashOutput {
                    hash,
                    bytes_read,
                    sampled: true,
                })
        };

        result.map_err(|e| HashError::from_io(path, e))
    }

    /// Hash the complete content of a file regardless of its size.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn full_hash(&self, path: &Path) -> Result<ContentHash, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        stream_hash(&mut file)
            .map(|(hash, _)| hash)
            .map_err(|e| HashError::from_io(path, e))
    }

    fn sample_hash(&self, file: &mut File, size: u64) -> io::Result<(ContentHash, u64)> {
        let chunk_size = size / self.sample_chunks;
        let capacity = usize::try_from(size)
            .unwrap_or(usize::MAX)
            .min(self.sample_buffer_size);
        let mut buffer = vec![0u8; capacity];
        let mut accumulator = 0u64;
        let mut bytes_read = 0u64;

        for chunk in 0..self.sample_chunks {
            let offset = chunk * chunk_size;
            file.seek(SeekFrom::Start(offset))?;

            let remaining = size.saturating_sub(offset);
            let want = usize::try_from(remaining)
                .unwrap_or(usize::MAX)
                .min(buffer.len());
            let n = read_fully(file, &mut buffer[..want])?;
            bytes_read += n as u64;

            let chunk_hash = XxHash3_64::oneshot(&buffer[..n]);
            accumulator = if chunk == 0 {
                chunk_hash
            } else {
                accumulator.rotate_left(1) ^ chunk_hash
            };
        }

        Ok((ContentHash(accumulator), bytes_read))
    }
}

fn stream_hash<R: Read>(reader: &mut R) -> io::Result<(ContentHash, u64)> {
    let mut hasher = XxHash3_64::with_seed(0);
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.write(&buffer[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok((ContentHash(hasher.finish()), total))
}

/// Fill `buf` as far as the reader allows; stops early only at EOF.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
