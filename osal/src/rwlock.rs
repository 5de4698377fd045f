// Copyright (C) Microsoft Corporation. All rights reserved.

//! Multi-reader/single-writer lock with writer preference.
//!
//! The lock is recursive per thread for both read and write captures, and
//! participates in the ordered-lock registry exactly as the plain lock
//! does: the precedence class is checked and registered on the first
//! non-recursive capture and released when the thread's recursive counts
//! both return to zero.
//!
//! Fairness policy: once a writer is pending (or a promotion is in
//! flight), newly-arriving first-time readers queue behind it; recursive
//! re-entries by threads already holding the lock are always admitted.
//! This bounds writer starvation. Relative order among multiple pending
//! writers is whatever the wait queue provides and is NOT guaranteed to be
//! FIFO.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::thread::ThreadId;

use parking_lot::Condvar;
use parking_lot::Mutex;
use swx_types::LockClass;
use swx_types::SwitchId;
use swx_types::Wait;

use crate::error::OsalError;
use crate::registry::LockRegistry;

/// Per-thread recursive hold counts on one rwlock instance.
#[derive(Default, Debug, Clone, Copy)]
struct ThreadHold {
    readers: u32,
    writers: u32,
}

struct RwState {
    active_readers: u32,
    active_writers: u32,
    pending_readers: u32,
    pending_writers: u32,
    /// Thread whose read hold is waiting to become the write hold.
    promoting: Option<ThreadId>,
    /// Grows on demand; an entry exists only while its thread holds the
    /// lock.
    threads: HashMap<ThreadId, ThreadHold>,
}

/// Snapshot of an rwlock's counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwCounters {
    /// Number of threads currently holding a read lock.
    pub active_readers: u32,
    /// 1 while a writer holds the lock, else 0.
    pub active_writers: u32,
    /// Threads blocked waiting to read.
    pub pending_readers: u32,
    /// Threads blocked waiting to write.
    pub pending_writers: u32,
}

/// A resource guard admitting many concurrent readers XOR one writer.
pub struct OsalRwLock {
    name: String,
    switch: SwitchId,
    class: LockClass,
    registry: Arc<LockRegistry>,
    state: Mutex<RwState>,
    read_queue: Condvar,
    write_queue: Condvar,
    promote_queue: Condvar,
}

impl OsalRwLock {
    /// Create an rwlock of the given precedence class.
    pub fn new(
        name: impl Into<String>,
        switch: SwitchId,
        class: LockClass,
        registry: Arc<LockRegistry>,
    ) -> OsalRwLock {
        OsalRwLock {
            name: name.into(),
            switch,
            class,
            registry,
            state: Mutex::new(RwState {
                active_readers: 0,
                active_writers: 0,
                pending_readers: 0,
                pending_writers: 0,
                promoting: None,
                threads: HashMap::new(),
            }),
            read_queue: Condvar::new(),
            write_queue: Condvar::new(),
            promote_queue: Condvar::new(),
        }
    }

    /// The lock's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lock's precedence class.
    pub fn class(&self) -> LockClass {
        self.class
    }

    fn admits_reader(state: &RwState) -> bool {
        state.active_writers == 0 && state.pending_writers == 0 && state.promoting.is_none()
    }

    fn admits_writer(state: &RwState) -> bool {
        state.active_writers == 0 && state.active_readers == 0
    }

    /// Wake the right class of waiter after a full release.
    fn wake_released(&self, state: &RwState) {
        if state.promoting.is_some() {
            // The promoter goes first; it is runnable once it is the last
            // active reader. Nothing else may be admitted meanwhile.
            if state.active_readers == 1 {
                self.promote_queue.notify_one();
            }
            return;
        }
        if Self::admits_writer(state) && state.pending_writers > 0 {
            self.write_queue.notify_one();
        } else if state.active_writers == 0
            && state.pending_writers == 0
            && state.pending_readers > 0
        {
            self.read_queue.notify_all();
        }
    }

    /// Capture a read lock, blocking per `wait`.
    ///
    /// Recursive-safe: a thread already holding this instance (for read or
    /// write) is admitted immediately, bypassing writer preference. A
    /// timeout restores the pending-reader count and leaves no lock held.
    pub fn capture_read_lock(&self, wait: Wait) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if let Some(hold) = state.threads.get_mut(&me) {
            hold.readers += 1;
            return Ok(());
        }

        self.registry.check_capture(me, self.class, &self.name)?;

        if !Self::admits_reader(&state) {
            if !wait.blocks() {
                return Err(OsalError::Timeout);
            }
            let deadline = wait.deadline();
            state.pending_readers += 1;
            while !Self::admits_reader(&state) {
                match deadline {
                    None => self.read_queue.wait(&mut state),
                    Some(deadline) => {
                        if self.read_queue.wait_until(&mut state, deadline).timed_out() {
                            if Self::admits_reader(&state) {
                                break;
                            }
                            state.pending_readers -= 1;
                            tracing::trace!(lock = %self.name, "read capture timed out");
                            return Err(OsalError::Timeout);
                        }
                    }
                }
            }
            state.pending_readers -= 1;
        }

        state.active_readers += 1;
        state.threads.insert(
            me,
            ThreadHold {
                readers: 1,
                writers: 0,
            },
        );
        self.registry.register_capture(me, self.class);
        Ok(())
    }

    /// Capture the write lock, blocking per `wait`.
    ///
    /// Recursive-safe for a thread already writing. A thread holding only
    /// a read lock is refused with [OsalError::WouldDeadlock]; it must use
    /// [OsalRwLock::promote_read_lock] or release and re-capture. No FIFO
    /// order is guaranteed among multiple pending writers.
    pub fn capture_write_lock(&self, wait: Wait) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if let Some(hold) = state.threads.get_mut(&me) {
            if hold.writers > 0 {
                hold.writers += 1;
                return Ok(());
            }
            return Err(OsalError::WouldDeadlock);
        }

        self.registry.check_capture(me, self.class, &self.name)?;

        if !Self::admits_writer(&state) {
            if !wait.blocks() {
                return Err(OsalError::Timeout);
            }
            let deadline = wait.deadline();
            state.pending_writers += 1;
            while !Self::admits_writer(&state) {
                match deadline {
                    None => self.write_queue.wait(&mut state),
                    Some(deadline) => {
                        if self
                            .write_queue
                            .wait_until(&mut state, deadline)
                            .timed_out()
                        {
                            if Self::admits_writer(&state) {
                                break;
                            }
                            state.pending_writers -= 1;
                            // The writer that queued behind us may have been
                            // the only thing holding readers back.
                            if state.pending_writers == 0
                                && state.active_writers == 0
                                && state.promoting.is_none()
                                && state.pending_readers > 0
                            {
                                self.read_queue.notify_all();
                            }
                            tracing::trace!(lock = %self.name, "write capture timed out");
                            return Err(OsalError::Timeout);
                        }
                    }
                }
            }
            state.pending_writers -= 1;
        }

        state.active_writers = 1;
        state.threads.insert(
            me,
            ThreadHold {
                readers: 0,
                writers: 1,
            },
        );
        self.registry.register_capture(me, self.class);
        Ok(())
    }

    /// Promote the calling thread's read hold to the write hold.
    ///
    /// First-requester-wins: the first requester parks until every other
    /// active reader has released; a second concurrent requester fails
    /// immediately with [OsalError::PromotionContested]. The thread's
    /// recursive read count survives the promotion and is restored when
    /// the write hold is fully released.
    pub fn promote_read_lock(&self, wait: Wait) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match state.threads.get(&me) {
            None => return Err(OsalError::NotHeld),
            Some(hold) if hold.writers > 0 => return Err(OsalError::AlreadyWriter),
            Some(_) => {}
        }
        if state.promoting.is_some() {
            return Err(OsalError::PromotionContested);
        }

        if state.active_readers > 1 {
            if !wait.blocks() {
                return Err(OsalError::Timeout);
            }
            let deadline = wait.deadline();
            state.promoting = Some(me);
            while state.active_readers > 1 {
                match deadline {
                    None => self.promote_queue.wait(&mut state),
                    Some(deadline) => {
                        if self
                            .promote_queue
                            .wait_until(&mut state, deadline)
                            .timed_out()
                        {
                            if state.active_readers == 1 {
                                break;
                            }
                            state.promoting = None;
                            if state.pending_writers == 0 && state.pending_readers > 0 {
                                self.read_queue.notify_all();
                            }
                            tracing::trace!(lock = %self.name, "promotion timed out");
                            return Err(OsalError::Timeout);
                        }
                    }
                }
            }
            state.promoting = None;
        }

        state.active_readers -= 1;
        state.active_writers = 1;
        if let Some(hold) = state.threads.get_mut(&me) {
            hold.writers = 1;
        }
        Ok(())
    }

    /// Release one level of read capture.
    pub fn release_read_lock(&self) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let Some(hold) = state.threads.get_mut(&me) else {
            return Err(OsalError::NotHeld);
        };
        if hold.readers == 0 {
            return Err(OsalError::NotHeld);
        }
        hold.readers -= 1;
        let counted_as_reader = hold.writers == 0;
        if hold.readers == 0 && counted_as_reader {
            state.threads.remove(&me);
            state.active_readers -= 1;
            self.registry.release_capture(me, self.class);
            self.wake_released(&state);
        }
        Ok(())
    }

    /// Release one level of write capture.
    ///
    /// A promoted thread whose recursive read holds survived the promotion
    /// reverts to an active reader when its write count returns to zero.
    pub fn release_write_lock(&self) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let Some(hold) = state.threads.get_mut(&me) else {
            return Err(OsalError::NotHeld);
        };
        if hold.writers == 0 {
            return Err(OsalError::NotHeld);
        }
        hold.writers -= 1;
        if hold.writers == 0 {
            let remaining_reads = hold.readers;
            state.active_writers = 0;
            if remaining_reads > 0 {
                // Demote back to a plain reader.
                state.active_readers += 1;
                if state.pending_writers == 0
                    && state.promoting.is_none()
                    && state.pending_readers > 0
                {
                    self.read_queue.notify_all();
                }
            } else {
                state.threads.remove(&me);
                self.registry.release_capture(me, self.class);
                self.wake_released(&state);
            }
        }
        Ok(())
    }

    /// The calling thread's current recursive (read, write) hold counts.
    pub fn thread_status(&self) -> (u32, u32) {
        let state = self.state.lock();
        state
            .threads
            .get(&thread::current().id())
            .map(|hold| (hold.readers, hold.writers))
            .unwrap_or((0, 0))
    }

    /// Snapshot of the lock's counters.
    pub fn counters(&self) -> RwCounters {
        let state = self.state.lock();
        RwCounters {
            active_readers: state.active_readers,
            active_writers: state.active_writers,
            pending_readers: state.pending_readers,
            pending_writers: state.pending_writers,
        }
    }

    /// Dump the lock's state, including the per-thread table, through the
    /// logging sink.
    pub fn dbg_dump(&self) {
        let state = self.state.lock();
        tracing::info!(
            lock = %self.name,
            switch = %self.switch,
            class = self.class.name(),
            active_readers = state.active_readers,
            active_writers = state.active_writers,
            pending_readers = state.pending_readers,
            pending_writers = state.pending_writers,
            promoting = ?state.promoting,
            "rwlock state"
        );
        for (thread, hold) in state.threads.iter() {
            tracing::info!(thread = ?thread, readers = hold.readers,
                writers = hold.writers, "rwlock hold");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::ViolationPolicy;

    use super::*;

    fn rwlock() -> OsalRwLock {
        OsalRwLock::new(
            "test",
            SwitchId::GLOBAL,
            LockClass::PortAttr,
            LockRegistry::new(ViolationPolicy::Enforce),
        )
    }

    fn idle() -> RwCounters {
        RwCounters {
            active_readers: 0,
            active_writers: 0,
            pending_readers: 0,
            pending_writers: 0,
        }
    }

    #[test]
    fn test_read_recursion_restores_idle_state() {
        let lock = rwlock();
        lock.capture_read_lock(Wait::Forever).unwrap();
        lock.capture_read_lock(Wait::Forever).unwrap();
        assert_eq!(lock.thread_status(), (2, 0));
        assert_eq!(lock.counters().active_readers, 1);

        lock.release_read_lock().unwrap();
        assert_eq!(lock.counters().active_readers, 1);
        lock.release_read_lock().unwrap();
        assert_eq!(lock.counters(), idle());
        assert_eq!(lock.thread_status(), (0, 0));
    }

    #[test]
    fn test_write_recursion() {
        let lock = rwlock();
        lock.capture_write_lock(Wait::Forever).unwrap();
        lock.capture_write_lock(Wait::Forever).unwrap();
        assert_eq!(lock.thread_status(), (0, 2));
        lock.release_write_lock().unwrap();
        assert_eq!(lock.counters().active_writers, 1);
        lock.release_write_lock().unwrap();
        assert_eq!(lock.counters(), idle());
    }

    #[test]
    fn test_writer_may_also_read() {
        let lock = rwlock();
        lock.capture_write_lock(Wait::Forever).unwrap();
        lock.capture_read_lock(Wait::Forever).unwrap();
        assert_eq!(lock.thread_status(), (1, 1));
        // The writer's own read does not count as an active reader.
        assert_eq!(lock.counters().active_readers, 0);
        lock.release_read_lock().unwrap();
        lock.release_write_lock().unwrap();
        assert_eq!(lock.counters(), idle());
    }

    #[test]
    fn test_write_while_reading_is_refused() {
        let lock = rwlock();
        lock.capture_read_lock(Wait::Forever).unwrap();
        assert_eq!(
            lock.capture_write_lock(Wait::Forever),
            Err(OsalError::WouldDeadlock)
        );
        lock.release_read_lock().unwrap();
    }

    #[test]
    fn test_release_without_hold_is_refused() {
        let lock = rwlock();
        assert_eq!(lock.release_read_lock(), Err(OsalError::NotHeld));
        assert_eq!(lock.release_write_lock(), Err(OsalError::NotHeld));

        lock.capture_read_lock(Wait::Forever).unwrap();
        assert_eq!(lock.release_write_lock(), Err(OsalError::NotHeld));
        lock.release_read_lock().unwrap();
    }

    #[test]
    fn test_sole_reader_promotes_immediately() {
        let lock = rwlock();
        lock.capture_read_lock(Wait::Forever).unwrap();
        lock.promote_read_lock(Wait::NoWait).unwrap();
        assert_eq!(lock.thread_status(), (1, 1));
        assert_eq!(lock.counters().active_writers, 1);
        assert_eq!(lock.counters().active_readers, 0);

        // Releasing the write hold demotes back to a reader.
        lock.release_write_lock().unwrap();
        assert_eq!(lock.counters().active_readers, 1);
        assert_eq!(lock.counters().active_writers, 0);
        lock.release_read_lock().unwrap();
        assert_eq!(lock.counters(), idle());
    }

    #[test]
    fn test_promotion_without_read_hold_is_refused() {
        let lock = rwlock();
        assert_eq!(lock.promote_read_lock(Wait::NoWait), Err(OsalError::NotHeld));

        lock.capture_write_lock(Wait::Forever).unwrap();
        assert_eq!(
            lock.promote_read_lock(Wait::NoWait),
            Err(OsalError::AlreadyWriter)
        );
        lock.release_write_lock().unwrap();
    }

    #[test]
    fn test_rwlock_participates_in_precedence() {
        let registry = LockRegistry::new(ViolationPolicy::Enforce);
        let junior = OsalRwLock::new("junior", SwitchId(1), LockClass::Acl, registry.clone());
        let senior = OsalRwLock::new("senior", SwitchId(1), LockClass::Switch, registry);

        junior.capture_read_lock(Wait::Forever).unwrap();
        let err = senior.capture_read_lock(Wait::Forever).unwrap_err();
        assert!(matches!(err, OsalError::PrecedenceViolation { .. }));
        junior.release_read_lock().unwrap();
    }
}
