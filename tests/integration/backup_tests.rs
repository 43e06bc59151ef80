use mediavault::actions::{backup_files, BackupConfig, BackupError, SpaceProbe};
use mediavault::cache::HashStore;
use mediavault::duplicates::DuplicateDetector;
use mediavault::records::RecordStatus;
use mediavault::scanner::batch::BatchConfig;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Unlimited;

impl SpaceProbe for Unlimited {
    fn available_space(&self, _path: &Path) -> Option<u64> {
        None
    }
}

struct Limited(u64);

impl SpaceProbe for Limited {
    fn available_space(&self, _path: &Path) -> Option<u64> {
        Some(self.0)
    }
}

fn write(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_detect_backup_reconcile_cycle() {
    let archive = TempDir::new().unwrap();
    write(archive.path(), "2023/img.jpg", b"archived");
    let source = TempDir::new().unwrap();
    write(source.path(), "DCIM/photo.jpg", b"archived");
    write(source.path(), "DCIM/new.png", b"brand new");
    write(source.path(), "DCIM/clip.mp4", b"new video");
    let sources = vec![source.path().to_path_buf()];

    let mut store = HashStore::open(archive.path()).unwrap();
    store.reconcile(&BatchConfig::default()).unwrap();
    let mut detection = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &sources)
        .unwrap()
        .into_inner();
    assert_eq!(detection.new_files.len(), 2);

    let config = BackupConfig::default().with_space_probe(Arc::new(Unlimited));
    let report = backup_files(
        &detection.new_files,
        &mut detection.states,
        archive.path(),
        "import",
        &config,
    )
    .unwrap()
    .into_inner();

    assert_eq!(report.success_count(), 2);
    assert!(archive.path().join("import/new.png").is_file());
    assert!(archive.path().join("import/clip.mp4").is_file());
    for record in &detection.new_files {
        assert_eq!(
            detection.states.status(record.path()),
            Some(RecordStatus::Completed)
        );
    }

    let result = store.reconcile(&BatchConfig::default()).unwrap().into_inner();
    assert_eq!(result.new_files().len(), 2);

    let again = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &sources)
        .unwrap()
        .into_inner();
    assert!(again.new_files.is_empty());
    assert_eq!(again.master_duplicates.len(), 3);
}

#[test]
fn test_collisions_get_numbered_names() {
    let archive = TempDir::new().unwrap();
    write(archive.path(), "in/a.jpg", b"first a");
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), "a.jpg", b"second a");
    write(second.path(), "a.jpg", b"third a");

    let store = HashStore::open(archive.path()).unwrap();
    let mut detection = DuplicateDetector::with_defaults()
        .detect(
            &store.snapshot(),
            &[first.path().to_path_buf(), second.path().to_path_buf()],
        )
        .unwrap()
        .into_inner();

    let config = BackupConfig::default().with_space_probe(Arc::new(Unlimited));
    backup_files(
        &detection.new_files,
        &mut detection.states,
        archive.path(),
        "in",
        &config,
    )
    .unwrap();

    assert_eq!(fs::read(archive.path().join("in/a.jpg")).unwrap(), b"first a");
    assert_eq!(fs::read(archive.path().join("in/a_1.jpg")).unwrap(), b"second a");
    assert_eq!(fs::read(archive.path().join("in/a_2.jpg")).unwrap(), b"third a");
}

#[test]
fn test_source_duplicates_not_copied() {
    let archive = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    write(source.path(), "a.jpg", b"twin");
    write(source.path(), "b.jpg", b"twin");

    let store = HashStore::open(archive.path()).unwrap();
    let mut detection = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();

    let config = BackupConfig::default().with_space_probe(Arc::new(Unlimited));
    let report = backup_files(
        &detection.new_files,
        &mut detection.states,
        archive.path(),
        "",
        &config,
    )
    .unwrap()
    .into_inner();

    assert_eq!(report.success_count(), 1);
    assert!(archive.path().join("a.jpg").exists());
    assert!(!archive.path().join("b.jpg").exists());
}

#[test]
fn test_insufficient_space_per_file() {
    let archive = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    write(source.path(), "big.mov", &[7u8; 4096]);
    write(source.path(), "small.jpg", b"12345");

    let store = HashStore::open(archive.path()).unwrap();
    let mut detection = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();

    let config = BackupConfig::default().with_space_probe(Arc::new(Limited(1024)));
    let report = backup_files(
        &detection.new_files,
        &mut detection.states,
        archive.path(),
        "",
        &config,
    )
    .unwrap()
    .into_inner();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failure_count(), 1);
    let (path, err) = &report.failures[0];
    assert_eq!(path, &source.path().join("big.mov"));
    match err {
        BackupError::InsufficientSpace {
            required,
            available,
            ..
        } => {
            assert_eq!(*required, 4096);
            assert_eq!(*available, 1024);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(detection.states.status(path), Some(RecordStatus::Error));
}

#[test]
fn test_deselected_records_skipped() {
    let archive = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    write(source.path(), "keep.jpg", b"keep");
    write(source.path(), "skip.jpg", b"skip");

    let store = HashStore::open(archive.path()).unwrap();
    let mut detection = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();
    assert!(detection.states.select(&source.path().join("skip.jpg"), false));

    let config = BackupConfig::default().with_space_probe(Arc::new(Unlimited));
    let report = backup_files(
        &detection.new_files,
        &mut detection.states,
        archive.path(),
        "",
        &config,
    )
    .unwrap()
    .into_inner();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.unselected, 1);
    assert!(!archive.path().join("skip.jpg").exists());
}

#[test]
fn test_destination_outside_archive_rejected() {
    let archive = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    write(source.path(), "a.jpg", b"a");

    let store = HashStore::open(archive.path()).unwrap();
    let mut detection = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();
    let escape = format!("../{}", source.path().file_name().unwrap().to_string_lossy());

    let config = BackupConfig::default().with_space_probe(Arc::new(Unlimited));
    let result = backup_files(
        &detection.new_files,
        &mut detection.states,
        archive.path(),
        &escape,
        &config,
    );

    assert!(matches!(result, Err(BackupError::InvalidDestination(_))));
    assert_eq!(
        detection.states.status(&source.path().join("a.jpg")),
        Some(RecordStatus::Pending)
    );
}
