//! Integration tests for the watch backend, using real directories on
//! disk via `tempfile`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asset_core::{ContentId, FileSystemConfig};
use asset_fs::{FileSystem, Flags};
use asset_scheduler::Scheduler;
use parking_lot::Mutex;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Scenario F: reading a file with REPORT_MISSING, then deleting it,
/// delivers one further callback carrying a null stream.
#[test]
fn watcher_missing_report_fires_on_delete() {
    let scheduler = Arc::new(Scheduler::new(2).unwrap());
    let root = tempfile::tempdir().unwrap();
    let file_path = root.path().join("gone");
    std::fs::write(&file_path, b"still here").unwrap();

    let fs = FileSystem::new(Arc::clone(&scheduler), root.path().to_path_buf(), FileSystemConfig::default()).unwrap();

    let missing_reported = Arc::new(AtomicBool::new(false));
    let missing_reported_clone = Arc::clone(&missing_reported);

    fs.read(
        ContentId::from_name("gone"),
        "root",
        "gone",
        ContentId::EMPTY,
        Flags::ADD_WATCH | Flags::REPORT_MISSING,
        Arc::new(move |stream| {
            if stream.is_none() {
                missing_reported_clone.store(true, Ordering::SeqCst);
            }
        }),
    )
    .unwrap();

    // Give the watch time to arm before deleting.
    std::thread::sleep(Duration::from_millis(200));
    std::fs::remove_file(&file_path).unwrap();

    let delivered = wait_until(Duration::from_secs(5), || missing_reported.load(Ordering::SeqCst));
    drop(scheduler);
    assert!(delivered, "expected a null-stream callback after deleting a REPORT_MISSING file");
}

/// Scan deltas use `;`-separated paths with `+`/`-` prefixes, while the
/// initial scan reports everything as existing with no prefix.
#[test]
fn scan_delta_uses_plus_and_minus_prefixes() {
    let scheduler = Arc::new(Scheduler::new(2).unwrap());
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("existing.txt"), b"x").unwrap();

    let fs = FileSystem::new(Arc::clone(&scheduler), root.path().to_path_buf(), FileSystemConfig::default()).unwrap();

    let initial = Arc::new(Mutex::new(None));
    let delta_added = Arc::new(Mutex::new(None));
    let initial_clone = Arc::clone(&initial);
    let delta_clone = Arc::clone(&delta_added);

    fs.scan(
        ContentId::from_name("lib-scan"),
        "root",
        ContentId::EMPTY,
        Flags::ADD_WATCH,
        Arc::new(move |_hash, existing, removed| {
            if !existing.is_empty() && initial_clone.lock().is_none() {
                *initial_clone.lock() = Some(existing);
            } else if !existing.is_empty() {
                *delta_clone.lock() = Some(existing);
            }
            let _ = removed;
        }),
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(initial.lock().as_deref(), Some("existing.txt"));

    std::fs::write(root.path().join("new.txt"), b"y").unwrap();
    let delivered = wait_until(Duration::from_secs(5), || delta_added.lock().is_some());
    drop(scheduler);
    assert!(delivered, "expected a delta scan callback after creating a file");
    assert_eq!(delta_added.lock().as_deref(), Some("+new.txt"));
}
