use mediavault::cache::HashStore;
use mediavault::duplicates::{DetectError, DetectorConfig, DuplicateDetector};
use mediavault::records::RecordStatus;
use mediavault::scanner::batch::BatchConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn indexed_archive(files: &[(&str, &[u8])]) -> (TempDir, HashStore) {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        write(dir.path(), name, content);
    }
    let mut store = HashStore::open(dir.path()).unwrap();
    store.reconcile(&BatchConfig::default()).unwrap();
    (dir, store)
}

#[test]
fn test_archived_photo_and_new_png() {
    let (archive, store) = indexed_archive(&[("2022/img.jpg", b"sunset pixels")]);
    let source = TempDir::new().unwrap();
    let photo = write(source.path(), "photo.jpg", b"sunset pixels");
    let new = write(source.path(), "new.png", b"fresh pixels");

    let outcome = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap();
    let report = outcome.into_inner();

    assert_eq!(report.source_files, 2);
    assert_eq!(report.new_files.len(), 1);
    assert_eq!(report.new_files[0].path(), new);
    assert_eq!(report.master_duplicates.len(), 1);
    assert_eq!(report.master_duplicates[0].path(), photo);

    assert_eq!(report.pairings.len(), 1);
    assert_eq!(report.pairings[0].file, photo);
    assert_eq!(
        report.pairings[0].master_copies,
        vec![archive.path().join("2022").join("img.jpg")]
    );
    assert_eq!(report.states.status(&photo), Some(RecordStatus::Duplicate));
    assert_eq!(report.states.status(&new), Some(RecordStatus::Pending));
}

#[test]
fn test_repeated_source_file() {
    let (_archive, store) = indexed_archive(&[]);
    let source = TempDir::new().unwrap();
    let a = write(source.path(), "a.jpg", b"same");
    let b = write(source.path(), "b.jpg", b"same");

    let report = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();

    assert_eq!(report.new_files.len(), 1);
    assert_eq!(report.new_files[0].path(), a);
    assert_eq!(report.source_duplicates.len(), 1);
    assert_eq!(report.source_duplicates[0].record.path(), b);
    assert_eq!(report.source_duplicates[0].first_occurrence, a);
    assert!(report.master_duplicates.is_empty());
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].in_source, vec![a, b]);
}

#[test]
fn test_master_wins_over_source_repeat() {
    let (_archive, store) = indexed_archive(&[("old.jpg", b"shared")]);
    let source = TempDir::new().unwrap();
    write(source.path(), "a.jpg", b"shared");
    write(source.path(), "b.jpg", b"shared");

    let report = DuplicateDetector::with_defaults()
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();

    assert_eq!(report.master_duplicates.len(), 2);
    assert!(report.source_duplicates.is_empty());
    assert_eq!(report.pairings[0].other_source_copies.len(), 1);
}

#[test]
fn test_multiple_sources_in_order() {
    let (_archive, store) = indexed_archive(&[]);
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let z = write(first.path(), "z.jpg", b"dup");
    let a = write(second.path(), "a.jpg", b"dup");

    let report = DuplicateDetector::with_defaults()
        .detect(
            &store.snapshot(),
            &[first.path().to_path_buf(), second.path().to_path_buf()],
        )
        .unwrap()
        .into_inner();

    assert_eq!(report.new_files[0].path(), z);
    assert_eq!(report.source_duplicates[0].record.path(), a);
}

#[test]
fn test_overlapping_sources_count_once() {
    let (_archive, store) = indexed_archive(&[]);
    let source = TempDir::new().unwrap();
    write(source.path(), "sub/a.jpg", b"a");

    let report = DuplicateDetector::with_defaults()
        .detect(
            &store.snapshot(),
            &[source.path().to_path_buf(), source.path().join("sub")],
        )
        .unwrap()
        .into_inner();

    assert_eq!(report.source_files, 1);
    assert_eq!(report.new_files.len(), 1);
    assert!(report.source_duplicates.is_empty());
}

#[test]
fn test_non_recursive_detection() {
    let (_archive, store) = indexed_archive(&[]);
    let source = TempDir::new().unwrap();
    write(source.path(), "top.jpg", b"top");
    write(source.path(), "nested/deep.jpg", b"deep");

    let detector = DuplicateDetector::new(DetectorConfig::default().with_recurse(false));
    let report = detector
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap()
        .into_inner();

    assert_eq!(report.source_files, 1);
}

#[test]
fn test_precondition_errors() {
    let (_archive, store) = indexed_archive(&[]);
    let detector = DuplicateDetector::with_defaults();
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "a.jpg", b"a");

    assert!(matches!(
        detector.detect(&store.snapshot(), &[]),
        Err(DetectError::NoSources)
    ));
    assert!(matches!(
        detector.detect(&store.snapshot(), &[dir.path().join("missing")]),
        Err(DetectError::SourceNotFound(_))
    ));
    assert!(matches!(
        detector.detect(&store.snapshot(), &[file]),
        Err(DetectError::NotADirectory(_))
    ));
}

#[test]
fn test_cancelled_detection() {
    let (_archive, store) = indexed_archive(&[]);
    let source = TempDir::new().unwrap();
    write(source.path(), "a.jpg", b"a");

    let detector = DuplicateDetector::new(
        DetectorConfig::default().with_shutdown_flag(Arc::new(AtomicBool::new(true))),
    );
    let outcome = detector
        .detect(&store.snapshot(), &[source.path().to_path_buf()])
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.value().new_files.is_empty());
}
