// Copyright (C) Microsoft Corporation. All rights reserved.

//! Recursive mutex wrapper with precedence checking.

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

struct LockState {
    owner: Option<ThreadId>,
    taken: u32,
}

/// A mutually-exclusive resource guard.
///
/// Recursive per thread: a thread that already owns the lock re-captures
/// it by bumping a depth counter without touching the underlying primitive
/// or the precedence registry. The first capture by a thread runs a
/// precedence check against [LockRegistry] before blocking.
///
/// The lock guards no data of its own; callers are responsible for routing
/// every access to the protected resource through it.
pub struct OsalLock {
    name: String,
    switch: SwitchId,
    class: LockClass,
    registry: Arc<LockRegistry>,
    state: Mutex<LockState>,
    available: Condvar,
}

impl OsalLock {
    /// Create a lock of the given precedence class.
    pub fn new(
        name: impl Into<String>,
        switch: SwitchId,
        class: LockClass,
        registry: Arc<LockRegistry>,
    ) -> OsalLock {
        OsalLock {
            name: name.into(),
            switch,
            class,
            registry,
            state: Mutex::new(LockState {
                owner: None,
                taken: 0,
            }),
            available: Condvar::new(),
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

    /// Capture the lock, blocking per `wait`.
    ///
    /// Re-capture by the owning thread succeeds immediately and only bumps
    /// the recursion depth. A timeout leaves the lock state untouched.
    pub fn capture(&self, wait: Wait) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.taken += 1;
            return Ok(());
        }

        self.registry.check_capture(me, self.class, &self.name)?;

        if state.owner.is_some() {
            if !wait.blocks() {
                return Err(OsalError::Timeout);
            }
            let deadline = wait.deadline();
            while state.owner.is_some() {
                match deadline {
                    None => self.available.wait(&mut state),
                    Some(deadline) => {
                        if self.available.wait_until(&mut state, deadline).timed_out() {
                            if state.owner.is_none() {
                                break;
                            }
                            tracing::trace!(lock = %self.name, "capture timed out");
                            return Err(OsalError::Timeout);
                        }
                    }
                }
            }
        }

        state.owner = Some(me);
        state.taken = 1;
        self.registry.register_capture(me, self.class);
        Ok(())
    }

    /// Release one level of capture.
    ///
    /// When the recursion depth returns to zero the lock is freed, the
    /// precedence class is unregistered and one waiter is woken. Releasing
    /// a lock the caller does not own is a usage error.
    pub fn release(&self) -> Result<(), OsalError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner != Some(me) {
            return Err(OsalError::NotOwner);
        }

        state.taken -= 1;
        if state.taken == 0 {
            state.owner = None;
            self.registry.release_capture(me, self.class);
            self.available.notify_one();
        }
        Ok(())
    }

    /// Non-blocking query of the current hold state, for diagnostics.
    pub fn is_taken(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Current recursion depth, for diagnostics.
    pub fn taken_count(&self) -> u32 {
        self.state.lock().taken
    }

    /// Dump the lock's state through the logging sink.
    pub fn dbg_dump(&self) {
        let state = self.state.lock();
        tracing::info!(
            lock = %self.name,
            switch = %self.switch,
            class = self.class.name(),
            owner = ?state.owner,
            taken = state.taken,
            "lock state"
        );
    }
}
