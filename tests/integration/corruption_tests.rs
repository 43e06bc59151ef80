use mediavault::cache::{HashStore, STORE_FILE_NAME};
use mediavault::scanner::batch::BatchConfig;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_garbage_index_treated_as_empty() {
    let archive = TempDir::new().unwrap();
    fs::write(archive.path().join("a.jpg"), b"a").unwrap();
    fs::write(archive.path().join(STORE_FILE_NAME), b"definitely { not json").unwrap();

    let mut store = HashStore::open(archive.path()).unwrap();
    assert!(store.is_empty());

    let result = store.reconcile(&BatchConfig::default()).unwrap().into_inner();
    assert_eq!(result.new_files().len(), 1);

    let text = fs::read_to_string(archive.path().join(STORE_FILE_NAME)).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
}

#[test]
fn test_invalid_entries_are_skipped() {
    let archive = TempDir::new().unwrap();
    let index = r#"{
  "good.jpg": { "relativePath": "good.jpg", "hash": "00000000000000ff", "lastModified": 1700000000000, "fileSize": 3 },
  "nohash.jpg": { "relativePath": "nohash.jpg", "hash": "", "lastModified": 1700000000000, "fileSize": 3 },
  "badhash.jpg": { "relativePath": "badhash.jpg", "hash": "xyz", "lastModified": 1700000000000, "fileSize": 3 },
  "negative.jpg": { "relativePath": "negative.jpg", "hash": "01", "lastModified": 1700000000000, "fileSize": -1 },
  "epoch.jpg": { "relativePath": "epoch.jpg", "hash": "02", "lastModified": 0, "fileSize": 1 },
  "nopath.jpg": { "relativePath": "", "hash": "03", "lastModified": 1700000000000, "fileSize": 1 },
  "wrongtype.jpg": 42
}"#;
    fs::write(archive.path().join(STORE_FILE_NAME), index).unwrap();

    let store = HashStore::open(archive.path()).unwrap();

    assert_eq!(store.len(), 1);
    let good = store.get("good.jpg").unwrap();
    assert_eq!(good.hash.as_u64(), 0xff);
    assert_eq!(good.file_size, 3);
}

#[test]
fn test_stale_entries_dropped_on_reconcile() {
    let archive = TempDir::new().unwrap();
    let index = r#"{
  "vanished.jpg": { "relativePath": "vanished.jpg", "hash": "abc", "lastModified": 1700000000000, "fileSize": 3 }
}"#;
    fs::write(archive.path().join(STORE_FILE_NAME), index).unwrap();

    let mut store = HashStore::open(archive.path()).unwrap();
    let result = store.reconcile(&BatchConfig::default()).unwrap().into_inner();

    assert!(result.deleted_files().contains_key("vanished.jpg"));
    assert!(store.is_empty());
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_counted_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let archive = TempDir::new().unwrap();
    let locked = archive.path().join("locked.jpg");
    fs::write(archive.path().join("open.jpg"), b"open").unwrap();
    fs::write(&locked, b"locked").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permission bits; nothing to check then.
    if fs::read(&locked).is_ok() {
        return;
    }

    let mut store = HashStore::open(archive.path()).unwrap();
    let result = store.reconcile(&BatchConfig::default()).unwrap().into_inner();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(result.hash_errors(), 1);
    assert_eq!(store.len(), 1);
    assert!(store.get("open.jpg").is_some());
}

#[cfg(unix)]
#[test]
fn test_unreadable_root_keeps_index() {
    use mediavault::cache::StoreError;
    use std::os::unix::fs::PermissionsExt;

    let archive = TempDir::new().unwrap();
    fs::write(archive.path().join("a.jpg"), b"a").unwrap();
    fs::write(archive.path().join("b.jpg"), b"b").unwrap();
    let mut store = HashStore::open(archive.path()).unwrap();
    store.reconcile(&BatchConfig::default()).unwrap();

    // Search and write permission, but no listing.
    fs::set_permissions(archive.path(), fs::Permissions::from_mode(0o300)).unwrap();
    if fs::read_dir(archive.path()).is_ok() {
        fs::set_permissions(archive.path(), fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = store.reconcile(&BatchConfig::default());
    fs::set_permissions(archive.path(), fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(result, Err(StoreError::Io { .. })));
    assert_eq!(store.len(), 2);
    assert_eq!(HashStore::open(archive.path()).unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_unreadable_subdirectory_keeps_its_entries() {
    use std::os::unix::fs::PermissionsExt;

    let archive = TempDir::new().unwrap();
    let album = archive.path().join("album");
    fs::create_dir(&album).unwrap();
    fs::write(album.join("x.jpg"), b"x").unwrap();
    fs::create_dir(archive.path().join("album2")).unwrap();
    fs::write(archive.path().join("album2/y.jpg"), b"y").unwrap();
    fs::write(archive.path().join("top.jpg"), b"top").unwrap();
    let mut store = HashStore::open(archive.path()).unwrap();
    store.reconcile(&BatchConfig::default()).unwrap();
    fs::remove_file(archive.path().join("album2/y.jpg")).unwrap();

    fs::set_permissions(&album, fs::Permissions::from_mode(0o300)).unwrap();
    if fs::read_dir(&album).is_ok() {
        fs::set_permissions(&album, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = store.reconcile(&BatchConfig::default()).unwrap().into_inner();
    fs::set_permissions(&album, fs::Permissions::from_mode(0o755)).unwrap();

    // Only the really deleted file goes; "album2" is not under "album".
    assert_eq!(result.deleted_files().len(), 1);
    assert!(result.deleted_files().contains_key("album2/y.jpg"));
    assert!(store.get("album/x.jpg").is_some());
    assert_eq!(HashStore::open(archive.path()).unwrap().len(), 2);
}
