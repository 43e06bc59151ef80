use filetime::FileTime;
use mediavault::cache::{HashStore, STORE_FILE_NAME};
use mediavault::progress::{ProgressCallback, ProgressUpdate};
use mediavault::scanner::batch::BatchConfig;
use mediavault::sync::{SyncConfig, SyncEngine, SyncError, DEFAULT_TEMP_DIR_NAME};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_archive() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "2023/summer/beach.jpg", b"beach");
    write(dir.path(), "2023/summer/surf.mp4", b"surfing video");
    write(dir.path(), "2024/snow.heic", b"snow");
    write(dir.path(), "readme.txt", b"mirrored too");
    dir
}

#[test]
fn test_sync_converges() {
    let archive = sample_archive();
    let target = TempDir::new().unwrap();
    let engine = SyncEngine::default();
    let targets = vec![target.path().to_path_buf()];

    let first = engine.sync(archive.path(), &targets).unwrap().into_inner();
    let stats = &first.stats[target.path()];
    assert_eq!(stats.copied, 4);
    assert!(first.succeeded.contains(target.path()));
    assert_eq!(
        fs::read(target.path().join("2023/summer/surf.mp4")).unwrap(),
        b"surfing video"
    );

    let second = engine.sync(archive.path(), &targets).unwrap().into_inner();
    let stats = &second.stats[target.path()];
    assert_eq!(stats.copied, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.skipped, 4);
    assert!(stats.is_noop());
}

#[test]
fn test_sync_preserves_mtime() {
    let archive = sample_archive();
    let source = archive.path().join("2024/snow.heic");
    filetime::set_file_mtime(&source, FileTime::from_unix_time(1_400_000_000, 0)).unwrap();
    let target = TempDir::new().unwrap();

    SyncEngine::default()
        .sync(archive.path(), &[target.path().to_path_buf()])
        .unwrap();

    let meta = fs::metadata(target.path().join("2024/snow.heic")).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_400_000_000);
}

#[test]
fn test_orphans_removed() {
    let archive = sample_archive();
    let target = TempDir::new().unwrap();
    write(target.path(), "stale.jpg", b"old");
    write(target.path(), "old_album/x.jpg", b"x");

    let outcome = SyncEngine::default()
        .sync(archive.path(), &[target.path().to_path_buf()])
        .unwrap()
        .into_inner();
    let stats = &outcome.stats[target.path()];

    assert_eq!(stats.deleted, 2);
    assert_eq!(stats.dirs_removed, 1);
    assert!(!target.path().join("stale.jpg").exists());
    assert!(!target.path().join("old_album").exists());
}

#[test]
fn test_changed_archive_file_recopied() {
    let archive = sample_archive();
    let target = TempDir::new().unwrap();
    let engine = SyncEngine::default();
    let targets = vec![target.path().to_path_buf()];
    engine.sync(archive.path(), &targets).unwrap();

    write(archive.path(), "2024/snow.heic", b"snow, retouched");
    let outcome = engine.sync(archive.path(), &targets).unwrap().into_inner();

    assert_eq!(outcome.stats[target.path()].copied, 1);
    assert_eq!(
        fs::read(target.path().join("2024/snow.heic")).unwrap(),
        b"snow, retouched"
    );
}

#[test]
fn test_index_and_temp_dir_not_mirrored() {
    let archive = sample_archive();
    let mut store = HashStore::open(archive.path()).unwrap();
    store.reconcile(&BatchConfig::default()).unwrap();
    write(archive.path(), &format!("{DEFAULT_TEMP_DIR_NAME}/partial.jpg"), b"half");
    let target = TempDir::new().unwrap();
    write(target.path(), STORE_FILE_NAME, b"{}");

    SyncEngine::default()
        .sync(archive.path(), &[target.path().to_path_buf()])
        .unwrap();

    assert!(!target.path().join(DEFAULT_TEMP_DIR_NAME).exists());
    assert_eq!(fs::read(target.path().join(STORE_FILE_NAME)).unwrap(), b"{}");
}

#[test]
fn test_multiple_targets() {
    let archive = sample_archive();
    let one = TempDir::new().unwrap();
    let two = TempDir::new().unwrap();
    let missing = two.path().join("created/on/demand");

    let outcome = SyncEngine::default()
        .sync(
            archive.path(),
            &[one.path().to_path_buf(), missing.clone()],
        )
        .unwrap()
        .into_inner();

    assert_eq!(outcome.succeeded.len(), 2);
    assert!(missing.join("2024/snow.heic").is_file());
    assert_eq!(outcome.totals().copied, 8);
}

#[test]
fn test_overlapping_targets_rejected() {
    let archive = sample_archive();
    let engine = SyncEngine::default();

    assert!(matches!(
        engine.sync(archive.path(), &[archive.path().join("backup")]),
        Err(SyncError::TargetInsideArchive(_))
    ));
    assert!(matches!(
        engine.sync(archive.path(), &[archive.path().parent().unwrap().to_path_buf()]),
        Err(SyncError::TargetContainsArchive(_))
    ));
    assert!(matches!(
        engine.sync(archive.path(), &[]),
        Err(SyncError::NoTargets)
    ));
    assert!(matches!(
        engine.sync(&archive.path().join("nope"), &[archive.path().to_path_buf()]),
        Err(SyncError::ArchiveNotFound(_))
    ));
}

#[test]
fn test_cancelled_sync_is_neither_success_nor_failure() {
    let archive = sample_archive();
    let target = TempDir::new().unwrap();
    let engine = SyncEngine::new(
        SyncConfig::default().with_shutdown_flag(Arc::new(AtomicBool::new(true))),
    );

    let outcome = engine
        .sync(archive.path(), &[target.path().to_path_buf()])
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.value().succeeded.is_empty());
    assert!(outcome.value().failed.is_empty());
}

#[test]
fn test_failing_target_does_not_stop_others() {
    let archive = sample_archive();
    let good = TempDir::new().unwrap();
    let blocker = TempDir::new().unwrap();
    write(blocker.path(), "plain.jpg", b"a file, not a folder");
    let bad = blocker.path().join("plain.jpg").join("mirror");

    let outcome = SyncEngine::default()
        .sync(archive.path(), &[bad.clone(), good.path().to_path_buf()])
        .unwrap()
        .into_inner();

    assert!(outcome.failed.contains_key(&bad));
    assert!(outcome.failed[&bad].contains("cannot create"));
    assert!(outcome.succeeded.contains(good.path()));
    assert!(!outcome.succeeded.contains(&bad));
    assert_eq!(outcome.stats[good.path()].copied, 4);
    assert!(good.path().join("2023/summer/beach.jpg").is_file());
}

#[cfg(unix)]
#[test]
fn test_read_only_copy_is_replaced() {
    use std::os::unix::fs::PermissionsExt;

    let archive = sample_archive();
    let photo = archive.path().join("2024/snow.heic");
    fs::set_permissions(&photo, fs::Permissions::from_mode(0o444)).unwrap();
    let target = TempDir::new().unwrap();
    let engine = SyncEngine::default();
    let targets = vec![target.path().to_path_buf()];
    engine.sync(archive.path(), &targets).unwrap();

    fs::set_permissions(&photo, fs::Permissions::from_mode(0o644)).unwrap();
    fs::write(&photo, b"snow, cropped and longer").unwrap();
    fs::set_permissions(&photo, fs::Permissions::from_mode(0o444)).unwrap();
    let outcome = engine.sync(archive.path(), &targets).unwrap().into_inner();

    assert!(outcome.failed.is_empty(), "{:?}", outcome.failed);
    assert!(outcome.succeeded.contains(target.path()));
    assert_eq!(outcome.stats[target.path()].copied, 1);
    let mirrored = target.path().join("2024/snow.heic");
    assert_eq!(fs::read(&mirrored).unwrap(), b"snow, cropped and longer");
    assert!(fs::metadata(&mirrored).unwrap().permissions().readonly());
}

struct StopAfterFirstFile(Arc<AtomicBool>);

impl ProgressCallback for StopAfterFirstFile {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}

    fn on_progress(&self, _update: &ProgressUpdate) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn on_phase_end(&self, _phase: &str) {}
}

#[test]
fn test_cancel_mid_copy_pass() {
    let archive = sample_archive();
    let target = TempDir::new().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let mut config = SyncConfig::default()
        .with_shutdown_flag(Arc::clone(&flag))
        .with_progress_callback(Arc::new(StopAfterFirstFile(Arc::clone(&flag))));
    config.progress_every = 1;

    let outcome = SyncEngine::new(config)
        .sync(archive.path(), &[target.path().to_path_buf()])
        .unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.value().stats[target.path()].copied, 1);
    assert!(target.path().join("2023/summer/beach.jpg").is_file());
    assert!(!target.path().join("2024/snow.heic").exists());
    assert!(outcome.value().succeeded.is_empty());
}
