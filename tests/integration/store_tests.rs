use filetime::FileTime;
use mediavault::cache::{HashStore, STORE_FILE_NAME};
use mediavault::scanner::batch::BatchConfig;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn archive_with(files: &[(&str, &[u8])]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn reconcile(root: &Path) -> (HashStore, mediavault::cache::ValidationResult) {
    let mut store = HashStore::open(root).unwrap();
    let outcome = store.reconcile(&BatchConfig::default()).unwrap();
    assert!(!outcome.is_cancelled());
    (store, outcome.into_inner())
}

#[test]
fn test_first_reconcile_indexes_everything() {
    let archive = archive_with(&[
        ("2023/beach.jpg", b"sand"),
        ("2023/clip.mp4", b"waves"),
        ("notes.txt", b"not media"),
    ]);

    let (store, result) = reconcile(archive.path());

    assert_eq!(result.files_scanned(), 2);
    assert_eq!(result.new_files().len(), 2);
    assert!(result.new_files().contains_key("2023/beach.jpg"));
    assert!(result.deleted_files().is_empty());
    assert_eq!(store.len(), 2);
    assert!(archive.path().join(STORE_FILE_NAME).is_file());
}

#[test]
fn test_reconcile_is_idempotent() {
    let archive = archive_with(&[("a.jpg", b"one"), ("b.png", b"two")]);
    let (first, _) = reconcile(archive.path());
    let saved = fs::read_to_string(archive.path().join(STORE_FILE_NAME)).unwrap();

    let (second, result) = reconcile(archive.path());

    assert!(!result.has_changes());
    assert_eq!(result.files_hashed(), 0);
    assert_eq!(
        first.entries().cloned().collect::<Vec<_>>(),
        second.entries().cloned().collect::<Vec<_>>()
    );
    assert_eq!(
        saved,
        fs::read_to_string(archive.path().join(STORE_FILE_NAME)).unwrap()
    );
}

#[test]
fn test_modified_file_detected() {
    let archive = archive_with(&[("a.jpg", b"original")]);
    let (store, _) = reconcile(archive.path());
    let old_hash = store.get("a.jpg").unwrap().hash;

    fs::write(archive.path().join("a.jpg"), b"edited in an app").unwrap();
    let (store, result) = reconcile(archive.path());

    assert_eq!(result.modified_files().len(), 1);
    assert_ne!(store.get("a.jpg").unwrap().hash, old_hash);
    assert!(result.new_files().is_empty());
}

#[test]
fn test_touched_file_refreshes_fingerprint_only() {
    let archive = archive_with(&[("a.jpg", b"same bytes")]);
    reconcile(archive.path());

    filetime::set_file_mtime(
        archive.path().join("a.jpg"),
        FileTime::from_unix_time(1_600_000_000, 0),
    )
    .unwrap();
    let (store, result) = reconcile(archive.path());

    assert_eq!(result.files_hashed(), 1);
    assert!(!result.has_changes());
    assert_eq!(store.get("a.jpg").unwrap().last_modified, 1_600_000_000_000);
}

#[test]
fn test_deleted_file_leaves_index() {
    let archive = archive_with(&[("keep.jpg", b"keep"), ("gone.jpg", b"gone")]);
    reconcile(archive.path());

    fs::remove_file(archive.path().join("gone.jpg")).unwrap();
    let (store, result) = reconcile(archive.path());

    assert_eq!(result.deleted_files().len(), 1);
    assert!(result.deleted_files().contains_key("gone.jpg"));
    assert!(store.get("gone.jpg").is_none());

    let reopened = HashStore::open(archive.path()).unwrap();
    assert_eq!(reopened.len(), 1);
    assert!(reopened.get("keep.jpg").is_some());
}

#[test]
fn test_force_rehash_reproduces_index() {
    let archive = archive_with(&[("a.jpg", b"a"), ("sub/b.mov", b"bb"), ("sub/c.heic", b"ccc")]);
    let (reconciled, _) = reconcile(archive.path());

    let mut store = HashStore::open(archive.path()).unwrap();
    let outcome = store.force_rehash(&BatchConfig::default()).unwrap();

    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.value().files_hashed(), 3);
    assert_eq!(outcome.value().new_files().len(), 3);
    assert!(outcome.value().modified_files().is_empty());
    assert!(outcome.value().deleted_files().is_empty());

    let settled = store.reconcile(&BatchConfig::default()).unwrap().into_inner();
    assert!(!settled.has_changes());
    assert_eq!(
        reconciled.entries().cloned().collect::<Vec<_>>(),
        store.entries().cloned().collect::<Vec<_>>()
    );
    assert_eq!(HashStore::open(archive.path()).unwrap().len(), 3);
}

#[test]
fn test_cancelled_reconcile_writes_nothing() {
    let archive = archive_with(&[("a.jpg", b"a")]);
    let mut store = HashStore::open(archive.path()).unwrap();
    let config = BatchConfig::default().with_shutdown_flag(Arc::new(AtomicBool::new(true)));

    let outcome = store.reconcile(&config).unwrap();

    assert!(outcome.is_cancelled());
    assert!(!archive.path().join(STORE_FILE_NAME).exists());
}

#[test]
fn test_cancelled_reconcile_keeps_deleted_entries() {
    let archive = archive_with(&[("a.jpg", b"a"), ("b.jpg", b"b")]);
    reconcile(archive.path());
    fs::remove_file(archive.path().join("b.jpg")).unwrap();

    let mut store = HashStore::open(archive.path()).unwrap();
    let config = BatchConfig::default().with_shutdown_flag(Arc::new(AtomicBool::new(true)));
    let outcome = store.reconcile(&config).unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.value().deleted_files().is_empty());
    assert!(store.get("b.jpg").is_some());
}

#[test]
fn test_persisted_format() {
    let archive = archive_with(&[("album/a.jpg", b"pixels")]);
    reconcile(archive.path());

    let text = fs::read_to_string(archive.path().join(STORE_FILE_NAME)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entry = &json["album/a.jpg"];

    assert_eq!(entry["relativePath"], "album/a.jpg");
    assert_eq!(entry["fileSize"], 6);
    assert!(entry["lastModified"].as_i64().unwrap() > 0);
    let hash = entry["hash"].as_str().unwrap();
    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(text.contains('\n'));
}

#[test]
fn test_open_missing_root_fails() {
    let dir = TempDir::new().unwrap();
    assert!(HashStore::open(&dir.path().join("missing")).is_err());
}

#[test]
fn test_store_file_not_indexed() {
    let archive = archive_with(&[("a.jpg", b"a")]);
    reconcile(archive.path());
    let (store, _) = reconcile(archive.path());
    assert!(store.get(STORE_FILE_NAME).is_none());
    assert_eq!(store.len(), 1);
}
