//! Shared directory reset, setup lock and dead-process cleanup.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use mpmetrics_client::multiproc::{LockFile, MetricKind, SharedStateDirectory};
use mpmetrics_core::ErrorKind;

fn entries(path: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn setup_twice_leaves_an_empty_existing_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = SharedStateDirectory::new(tmp.path().join("mp"), true);

    dir.setup(None).unwrap();
    assert!(dir.path().is_dir());
    assert!(entries(dir.path()).is_empty());

    dir.setup(None).unwrap();
    assert!(dir.path().is_dir());
    assert!(entries(dir.path()).is_empty());
}

#[test]
fn setup_wipes_previous_run() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mp");
    fs::create_dir_all(path.join("nested")).unwrap();
    fs::write(path.join("counter_1.json"), "{}").unwrap();

    SharedStateDirectory::new(&path, true).setup(None).unwrap();
    assert!(entries(&path).is_empty());
}

#[test]
fn setup_is_a_noop_without_multiproc() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("keep");
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("counter_1.json"), "{}").unwrap();

    SharedStateDirectory::new(&path, false).setup(None).unwrap();
    assert_eq!(entries(&path), vec!["counter_1.json".to_string()]);
}

#[test]
fn empty_path_is_a_configuration_error() {
    let err = SharedStateDirectory::new("", true).setup(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn setup_releases_lock_afterwards() {
    let tmp = tempfile::tempdir().unwrap();
    let lock = LockFile::new(
        tmp.path().join("mp.lock"),
        Duration::from_secs(1),
        Duration::from_secs(60),
    );
    let dir = SharedStateDirectory::new(tmp.path().join("mp"), true);

    dir.setup(Some(&lock)).unwrap();
    assert!(!lock.path().exists());

    // Released, so a second setup acquires it again.
    dir.setup(Some(&lock)).unwrap();
    assert!(!lock.path().exists());
}

#[test]
fn setup_releases_lock_on_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let lock = LockFile::new(
        tmp.path().join("mp.lock"),
        Duration::from_secs(1),
        Duration::from_secs(60),
    );
    // A regular file where the directory should go.
    let blocker = tmp.path().join("file");
    fs::write(&blocker, "x").unwrap();
    let dir = SharedStateDirectory::new(blocker.join("mp"), true);

    assert!(dir.setup(Some(&lock)).is_err());
    assert!(!lock.path().exists());
}

#[test]
fn held_lock_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let lock = LockFile::new(
        tmp.path().join("mp.lock"),
        Duration::from_millis(50),
        Duration::from_secs(60),
    );
    let _held = lock.acquire().unwrap();

    let err = lock.acquire().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);

    let dir = SharedStateDirectory::new(tmp.path().join("mp"), true);
    let err = dir.setup(Some(&lock)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);
    assert!(!dir.path().exists());
}

#[test]
fn stale_lock_is_taken_over() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mp.lock");
    fs::write(&path, "12345\n").unwrap();

    let lock = LockFile::new(&path, Duration::from_millis(200), Duration::ZERO);
    let guard = lock.acquire().unwrap();
    assert!(path.exists());
    drop(guard);
    assert!(!path.exists());
}

#[test]
fn waiters_racing_for_a_stale_lock_hold_it_one_at_a_time() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mp.lock");
    fs::write(&path, "12345\n").unwrap();
    thread::sleep(Duration::from_millis(300));

    let lock = LockFile::new(&path, Duration::from_secs(10), Duration::from_millis(250));
    let start = Barrier::new(4);
    let inside = AtomicUsize::new(0);
    let max_inside = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                start.wait();
                let guard = lock.acquire().unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                inside.fetch_sub(1, Ordering::SeqCst);
                drop(guard);
            });
        }
    });

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!path.exists());
    // No moved-aside lock files left behind.
    assert!(entries(tmp.path()).is_empty());
}

#[test]
fn guard_leaves_a_lock_it_no_longer_owns() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mp.lock");
    let lock = LockFile::new(&path, Duration::from_secs(1), Duration::from_secs(60));

    let guard = lock.acquire().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), guard.token());

    fs::write(&path, "another-owner").unwrap();
    drop(guard);
    assert_eq!(fs::read_to_string(&path).unwrap(), "another-owner");
}

#[test]
fn waiter_never_breaks_a_fresh_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("mp.lock");
    let holder = LockFile::new(&path, Duration::from_secs(1), Duration::from_secs(60));
    let guard = holder.acquire().unwrap();

    let waiter = LockFile::new(&path, Duration::from_millis(50), Duration::from_secs(60));
    let err = waiter.acquire().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);

    assert_eq!(fs::read_to_string(&path).unwrap(), guard.token());
    drop(guard);
    assert!(!path.exists());
}

#[test]
fn mark_process_dead_only_touches_that_pid() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = SharedStateDirectory::new(tmp.path().join("mp"), true);
    dir.setup(None).unwrap();
    for name in [
        "counter_10_0.json",
        "gauge_10_0.json",
        "gauge_10_3.json",
        "histogram_10_0.json",
        "counter_11_1.json",
        "gauge_11_1.json",
    ] {
        fs::write(dir.path().join(name), "{}").unwrap();
    }

    dir.mark_process_dead(10).unwrap();
    assert_eq!(
        entries(dir.path()),
        vec![
            "counter_10_0.json",
            "counter_11_1.json",
            "gauge_11_1.json",
            "histogram_10_0.json",
        ]
    );

    // Unknown pid and repeated calls are no-ops.
    dir.mark_process_dead(10).unwrap();
    dir.mark_process_dead(99).unwrap();
    assert_eq!(entries(dir.path()).len(), 4);
}

#[test]
fn shard_listing_ignores_foreign_files_and_missing_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = SharedStateDirectory::new(tmp.path().join("mp"), true);
    assert!(dir.shard_files().unwrap().is_empty());

    dir.setup(None).unwrap();
    fs::write(dir.path().join("summary_7_2.json"), "{}").unwrap();
    fs::write(dir.path().join(".tmpA1b2C3"), "{}").unwrap();
    fs::write(dir.path().join("notes.txt"), "").unwrap();
    fs::write(dir.path().join("counter_x_0.json"), "{}").unwrap();
    fs::write(dir.path().join("counter_8.json"), "{}").unwrap();
    fs::write(dir.path().join("gauge_8_0_1.json"), "{}").unwrap();

    let files = dir.shard_files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, MetricKind::Summary);
    assert_eq!(files[0].1, 7);
}
