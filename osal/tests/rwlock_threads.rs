// Copyright (C) Microsoft Corporation. All rights reserved.

//! Multi-thread behavior of the reader/writer lock.

mod common;

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use swx_osal::OsalError;
use swx_osal::OsalRwLock;
use swx_osal::RwCounters;
use swx_types::LockClass;
use swx_types::SwitchId;
use swx_types::Wait;

fn rwlock() -> Arc<OsalRwLock> {
    Arc::new(OsalRwLock::new(
        "itest",
        SwitchId(1),
        LockClass::PortAttr,
        common::registry(),
    ))
}

const IDLE: RwCounters = RwCounters {
    active_readers: 0,
    active_writers: 0,
    pending_readers: 0,
    pending_writers: 0,
};

#[test]
fn test_writers_are_mutually_exclusive() {
    let lock = rwlock();
    let in_critical = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let lock = lock.clone();
        let in_critical = in_critical.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..10 {
                lock.capture_write_lock(Wait::Forever).unwrap();
                assert_eq!(in_critical.fetch_add(1, Ordering::SeqCst), 0);
                thread::sleep(Duration::from_millis(1));
                in_critical.fetch_sub(1, Ordering::SeqCst);
                lock.release_write_lock().unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_no_read_succeeds_while_writing() {
    let lock = rwlock();
    let writer_active = Arc::new(AtomicU32::new(0));

    lock.capture_write_lock(Wait::Forever).unwrap();
    writer_active.store(1, Ordering::SeqCst);

    let lock_clone = lock.clone();
    let writer_active_clone = writer_active.clone();
    let reader = thread::spawn(move || {
        lock_clone.capture_read_lock(Wait::Forever).unwrap();
        // Never observable while the writer still holds the lock.
        assert_eq!(writer_active_clone.load(Ordering::SeqCst), 0);
        lock_clone.release_read_lock().unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    writer_active.store(0, Ordering::SeqCst);
    lock.release_write_lock().unwrap();
    reader.join().unwrap();
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_readers_run_concurrently() {
    const READERS: usize = 4;
    let lock = rwlock();
    let inside = Arc::new(Barrier::new(READERS));
    let done = Arc::new(Barrier::new(READERS));

    let mut handles = Vec::new();
    for i in 0..READERS {
        let lock = lock.clone();
        let inside = inside.clone();
        let done = done.clone();
        handles.push(thread::spawn(move || {
            lock.capture_read_lock(Wait::Forever).unwrap();
            // Every reader must get here while all the others hold their
            // read lock, otherwise the barrier would deadlock.
            inside.wait();
            if i == 0 {
                assert_eq!(lock.counters().active_readers, READERS as u32);
            }
            done.wait();
            lock.release_read_lock().unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(lock.counters(), IDLE);
}

/// The end-to-end admission scenario: T1 reads, T2's write queues, T3's
/// read queues behind the pending writer, and release order is writer
/// first, reader second.
#[test]
fn test_writer_preference_end_to_end() {
    let lock = rwlock();
    let events = Arc::new(eventlog::EventLog::new());

    // T1: the main thread captures for read.
    lock.capture_read_lock(Wait::Forever).unwrap();

    // T2: a writer queues.
    let (writer_in, writer_in_rx) = mpsc::channel();
    let lock_t2 = lock.clone();
    let events_t2 = events.clone();
    let t2 = thread::spawn(move || {
        lock_t2.capture_write_lock(Wait::Forever).unwrap();
        events_t2.push("writer");
        writer_in.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        lock_t2.release_write_lock().unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    let counters = lock.counters();
    assert_eq!(counters.active_readers, 1);
    assert_eq!(counters.pending_writers, 1);

    // T3: a new reader must queue behind the pending writer.
    let lock_t3 = lock.clone();
    let events_t3 = events.clone();
    let t3 = thread::spawn(move || {
        lock_t3.capture_read_lock(Wait::Forever).unwrap();
        events_t3.push("reader");
        lock_t3.release_read_lock().unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    let counters = lock.counters();
    assert_eq!(counters.pending_readers, 1);
    assert_eq!(counters.pending_writers, 1);

    // T1 releases: the writer goes first, the reader after it.
    lock.release_read_lock().unwrap();
    writer_in_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    t2.join().unwrap();
    t3.join().unwrap();
    assert_eq!(events.snapshot(), vec!["writer", "reader"]);
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_write_timeout_precision_and_bookkeeping() {
    let lock = rwlock();
    let (hold_done, hold_done_rx) = mpsc::channel();
    let (release_now, release_now_rx) = mpsc::channel::<()>();

    let lock_holder = lock.clone();
    let holder = thread::spawn(move || {
        lock_holder.capture_write_lock(Wait::Forever).unwrap();
        hold_done.send(()).unwrap();
        release_now_rx.recv().unwrap();
        lock_holder.release_write_lock().unwrap();
    });
    hold_done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let requested = Duration::from_millis(150);
    let start = Instant::now();
    assert_eq!(lock.capture_write_lock(Wait::For(requested)), Err(OsalError::Timeout));
    assert!(start.elapsed() >= requested);

    // The failed capture must leave no residue behind.
    let counters = lock.counters();
    assert_eq!(counters.pending_writers, 0);
    assert_eq!(counters.pending_readers, 0);
    assert_eq!(lock.capture_write_lock(Wait::NoWait), Err(OsalError::Timeout));

    release_now.send(()).unwrap();
    holder.join().unwrap();

    // A later attempt behaves as if the timed-out one never happened.
    lock.capture_write_lock(Wait::NoWait).unwrap();
    lock.release_write_lock().unwrap();
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_read_timeout_precision_and_bookkeeping() {
    let lock = rwlock();
    let (hold_done, hold_done_rx) = mpsc::channel();
    let (release_now, release_now_rx) = mpsc::channel::<()>();

    let lock_holder = lock.clone();
    let holder = thread::spawn(move || {
        lock_holder.capture_write_lock(Wait::Forever).unwrap();
        hold_done.send(()).unwrap();
        release_now_rx.recv().unwrap();
        lock_holder.release_write_lock().unwrap();
    });
    hold_done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let requested = Duration::from_millis(150);
    let start = Instant::now();
    assert_eq!(lock.capture_read_lock(Wait::For(requested)), Err(OsalError::Timeout));
    assert!(start.elapsed() >= requested);

    // The failed capture must leave no residue behind.
    let counters = lock.counters();
    assert_eq!(counters.pending_readers, 0);
    assert_eq!(counters.pending_writers, 0);
    assert_eq!(lock.thread_status(), (0, 0));
    assert_eq!(lock.capture_read_lock(Wait::NoWait), Err(OsalError::Timeout));

    release_now.send(()).unwrap();
    holder.join().unwrap();

    // A later attempt behaves as if the timed-out one never happened.
    lock.capture_read_lock(Wait::NoWait).unwrap();
    lock.release_read_lock().unwrap();
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_recursive_reads_wake_no_writer_early() {
    let lock = rwlock();
    lock.capture_read_lock(Wait::Forever).unwrap();
    lock.capture_read_lock(Wait::Forever).unwrap();

    let (acquired, acquired_rx) = mpsc::channel();
    let lock_writer = lock.clone();
    let writer = thread::spawn(move || {
        lock_writer.capture_write_lock(Wait::Forever).unwrap();
        acquired.send(()).unwrap();
        lock_writer.release_write_lock().unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    lock.release_read_lock().unwrap();
    // One release of two: the writer must still be blocked.
    assert!(acquired_rx.recv_timeout(Duration::from_millis(100)).is_err());

    lock.release_read_lock().unwrap();
    acquired_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    writer.join().unwrap();
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_promotion_first_requester_wins() {
    let lock = rwlock();
    lock.capture_read_lock(Wait::Forever).unwrap();

    let (requested, requested_rx) = mpsc::channel();
    let (promoted, promoted_rx) = mpsc::channel();
    let lock_promoter = lock.clone();
    let promoter = thread::spawn(move || {
        lock_promoter.capture_read_lock(Wait::Forever).unwrap();
        requested.send(()).unwrap();
        lock_promoter.promote_read_lock(Wait::Forever).unwrap();
        promoted.send(()).unwrap();
        lock_promoter.release_write_lock().unwrap();
        lock_promoter.release_read_lock().unwrap();
    });
    requested_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    thread::sleep(Duration::from_millis(50));

    // The other reader's competing request fails immediately.
    assert_eq!(
        lock.promote_read_lock(Wait::Forever),
        Err(OsalError::PromotionContested)
    );
    assert!(promoted_rx.recv_timeout(Duration::from_millis(50)).is_err());

    // Releasing the last other read hold lets the promoter through.
    lock.release_read_lock().unwrap();
    promoted_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    promoter.join().unwrap();
    assert_eq!(lock.counters(), IDLE);
}

#[test]
fn test_thread_status_is_per_thread() {
    let lock = rwlock();
    lock.capture_read_lock(Wait::Forever).unwrap();
    lock.capture_read_lock(Wait::Forever).unwrap();
    assert_eq!(lock.thread_status(), (2, 0));

    let lock_clone = lock.clone();
    thread::spawn(move || {
        assert_eq!(lock_clone.thread_status(), (0, 0));
        lock_clone.capture_read_lock(Wait::Forever).unwrap();
        assert_eq!(lock_clone.thread_status(), (1, 0));
        lock_clone.release_read_lock().unwrap();
    })
    .join()
    .unwrap();

    lock.release_read_lock().unwrap();
    lock.release_read_lock().unwrap();
    assert_eq!(lock.counters(), IDLE);
}

/// Tiny append-only event log used to assert admission order.
mod eventlog {
    use parking_lot::Mutex;

    pub struct EventLog {
        events: Mutex<Vec<&'static str>>,
    }

    impl EventLog {
        pub fn new() -> EventLog {
            EventLog {
                events: Mutex::new(Vec::new()),
            }
        }

        pub fn push(&self, event: &'static str) {
            self.events.lock().push(event);
        }

        pub fn snapshot(&self) -> Vec<&'static str> {
            self.events.lock().clone()
        }
    }
}
