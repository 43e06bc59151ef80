//! Path and timestamp helpers for archive index keys.
//!
//! Index keys are relative to the archive root, use `/` as separator on
//! every platform and are normalized to Unicode NFC. macOS stores names
//! decomposed (NFD), so without normalization the same photo would get two
//! different keys depending on which machine indexed it.
//!
//! - NFC: `café.jpg` - 'é' is U+00E9 (single code point)
//! - NFD: `café.jpg` - 'e' U+0065 + combining acute accent U+0301
//!
//! # Example
//!
//! ```
//! use mediavault::scanner::path_utils::relative_key;
//! use std::path::Path;
//!
//! let key = relative_key(Path::new("/archive"), Path::new("/archive/2024/cafe\u{0301}.jpg"));
//! assert_eq!(key.as_deref(), Some("2024/café.jpg"));
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to NFC (Composed) form.
///
/// ```
/// use mediavault::scanner::path_utils::normalize_path_str;
///
/// assert_eq!(normalize_path_str("cafe\u{0301}.jpg"), "café.jpg");
/// ```
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Build the index key for `path` relative to `root`.
///
/// Returns `None` when `path` is not below `root` or when it resolves to
/// the root itself.
#[must_use]
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(normalize_path_str(&part.to_string_lossy())),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Resolve an index key back to an absolute path below `root`.
#[must_use]
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
    key.split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Convert a filesystem timestamp to epoch milliseconds.
///
/// Times before the epoch map to negative values.
#[must_use]
pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

/// Convert epoch milliseconds back to a [`SystemTime`].
#[must_use]
pub fn millis_to_system_time(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH + Duration::from_millis(millis.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}

/// File name of `path` for progress messages, falling back to the full path.
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
