use mediavault::cache::HashStore;
use mediavault::operation::{self, OperationEvent, ProgressEvent};
use mediavault::progress::phase;
use mediavault::scanner::batch::BatchConfig;
use mediavault::Outcome;
use std::fs;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_reconcile_in_background_reports_phases() {
    let archive = TempDir::new().unwrap();
    for i in 0..5 {
        fs::write(archive.path().join(format!("img_{i}.jpg")), format!("pixels {i}")).unwrap();
    }
    let root = archive.path().to_path_buf();

    let handle = operation::spawn("reconcile", move |ctx| {
        let mut store = HashStore::open(&root)?;
        let config = BatchConfig::default()
            .with_shutdown_flag(ctx.shutdown_flag())
            .with_progress_callback(ctx.progress());
        Ok(store.reconcile(&config)?)
    })
    .unwrap();

    let mut events = Vec::new();
    let outcome = handle.wait_with(|event| events.push(event.clone())).unwrap();

    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.value().new_files().len(), 5);
    assert!(events.contains(&ProgressEvent::PhaseStarted {
        phase: phase::HASH.to_string(),
        total: 5
    }));
    assert!(events.contains(&ProgressEvent::PhaseEnded {
        phase: phase::HASH.to_string()
    }));
    let last_update = events
        .iter()
        .rev()
        .find_map(|e| match e {
            ProgressEvent::Update(u) => Some(u.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_update.current, 5);
}

#[test]
fn test_finished_is_last_event() {
    let handle = operation::spawn("noop", |_ctx| Ok(Outcome::Completed(7u32))).unwrap();

    let mut finished = 0;
    let mut after_finished = 0;
    for event in handle.events().iter() {
        if finished > 0 {
            after_finished += 1;
        }
        if let OperationEvent::Finished(result) = event {
            assert_eq!(result.unwrap(), Outcome::Completed(7));
            finished += 1;
        }
    }
    assert_eq!(finished, 1);
    assert_eq!(after_finished, 0);
}

#[test]
fn test_cancel_sets_flag() {
    let handle = operation::spawn("spin", |ctx| {
        let mut ticks = 0u32;
        while !ctx.is_cancelled() && ticks < 5_000 {
            thread::sleep(Duration::from_millis(1));
            ticks += 1;
        }
        Ok(Outcome::from_flag(ctx.is_cancelled(), ticks))
    })
    .unwrap();

    thread::sleep(Duration::from_millis(20));
    handle.cancel();
    let outcome = handle.wait().unwrap();
    assert!(outcome.is_cancelled());
}

#[test]
fn test_error_and_panic_are_reported() {
    let failing = operation::spawn::<(), _>("fail", |_ctx| Err(anyhow::anyhow!("boom"))).unwrap();
    let err = failing.wait().unwrap_err();
    assert!(err.to_string().contains("boom"));

    let panicking = operation::spawn::<(), _>("panic", |_ctx| panic!("worker exploded")).unwrap();
    assert!(panicking.wait().is_err());
}

#[test]
fn test_handle_name() {
    let handle = operation::spawn("sync", |_ctx| Ok(Outcome::Completed(()))).unwrap();
    assert_eq!(handle.name(), "sync");
    handle.wait().unwrap();
}
