use prefdb::{MemoryEngine, PrefDb, StoreConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_shared() -> (TempDir, Arc<PrefDb<MemoryEngine>>) {
    let dir = TempDir::new().unwrap();
    let db = PrefDb::open(StoreConfig::new(dir.path())).unwrap();
    (dir, Arc::new(db))
}

#[test]
fn reads_racing_reopen_block_instead_of_failing() {
    let (_dir, db) = open_shared();
    db.put_i32("stable", 7).unwrap();

    let readers = 4;
    let barrier = Arc::new(Barrier::new(readers + 1));
    let mut handles = Vec::new();

    for _ in 0..readers {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..200 {
                // must never observe a closed handle mid-reopen
                assert_eq!(db.get_i32("stable", -1).unwrap(), 7);
            }
        }));
    }

    let flusher = {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                db.flush().unwrap();
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    flusher.join().unwrap();
}

#[test]
fn editors_are_serialized_by_the_permit() {
    let (_dir, db) = open_shared();
    let concurrent = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(4));

    let mut handles = Vec::new();
    for i in 0..4 {
        let db = Arc::clone(&db);
        let concurrent = Arc::clone(&concurrent);
        let peak = Arc::clone(&peak);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            db.begin_edit().unwrap();
            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            db.put_i32(&format!("editor.{i}"), i as i32).unwrap();
            thread::sleep(Duration::from_millis(10));
            concurrent.fetch_sub(1, Ordering::SeqCst);
            assert!(db.commit().unwrap());
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    for i in 0..4 {
        assert_eq!(db.get_i32(&format!("editor.{i}"), -1).unwrap(), i as i32);
    }
}

#[test]
fn concurrent_writers_lose_no_updates() {
    let (_dir, db) = open_shared();
    let threads = 8;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(threads));

    let mut handles = Vec::new();
    for t in 0..threads {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..per_thread {
                db.put_i64(&format!("w.{t}.{i}"), (t * 1000 + i) as i64)
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.entry_count().unwrap(), threads * per_thread);
    assert_eq!(db.get_i64("w.3.7", -1).unwrap(), 3007);
}

#[test]
fn cursor_force_released_by_reopen_terminates_cleanly() {
    let (_dir, db) = open_shared();
    for i in 0..5 {
        db.put_i32(&format!("scan.{i}"), i).unwrap();
    }

    let mut cursor = db.find("scan.").unwrap();
    let first = cursor.next().unwrap().unwrap();
    assert_eq!(first.key(), "scan.0");

    // reopen tears down the engine iterator underneath the cursor
    db.flush().unwrap();

    assert!(cursor.next().is_none());
    // already-yielded entries stay usable
    assert_eq!(first.as_i32().unwrap(), 0);
    // the store itself is fully functional
    assert_eq!(db.size_by_prefix("scan.").unwrap(), 5);
}

#[test]
fn close_unblocks_waiting_editor() {
    let (_dir, db) = open_shared();
    db.begin_edit().unwrap();

    let waiter = {
        let db = Arc::clone(&db);
        thread::spawn(move || db.begin_edit())
    };

    thread::sleep(Duration::from_millis(50));
    db.close().unwrap();

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(prefdb::PrefDbError::Closed)));
}
