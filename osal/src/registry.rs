// Copyright (C) Microsoft Corporation. All rights reserved.

//! Ordered-lock registry.
//!
//! Tracks, per thread, the set of lock classes currently held and refuses
//! captures that run against the global precedence list. Detection is
//! unconditional; whether a detected violation blocks the capture is the
//! registry's [ViolationPolicy].

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use bitfield::Bit;
use bitfield::BitMut;
use parking_lot::Mutex;
use swx_types::LockClass;

use crate::error::OsalError;

/// What to do when a precedence violation is detected.
///
/// The violation is logged in either case; the policy only decides whether
/// the offending capture is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationPolicy {
    /// Refuse the capture with [OsalError::PrecedenceViolation].
    Enforce,
    /// Log the violation and let the capture proceed.
    LogOnly,
}

/// Per-thread record of held lock classes.
///
/// A class is shared by every lock instance of that subsystem, so holds
/// are counted per class; the mask bit clears only when the last instance
/// of the class is released.
#[derive(Default)]
struct ThreadHeld {
    mask: u64,
    counts: [u32; LockClass::COUNT],
}

/// Process-wide lock-ordering context.
///
/// Created once at SDK initialization and handed to every lock via
/// `Arc<LockRegistry>`; there is no hidden global instance.
pub struct LockRegistry {
    policy: ViolationPolicy,
    threads: Mutex<HashMap<ThreadId, ThreadHeld>>,
}

impl LockRegistry {
    /// Create a registry with the given violation policy.
    pub fn new(policy: ViolationPolicy) -> Arc<LockRegistry> {
        Arc::new(LockRegistry {
            policy,
            threads: Mutex::new(HashMap::new()),
        })
    }

    /// The registry's violation policy.
    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    /// Validate that `thread` may capture a lock of `class`.
    ///
    /// Fails when the thread already holds a class listed after `class` in
    /// the global order. The [LockClass::NoPrecedence] sentinel always
    /// passes and is exempt from bookkeeping.
    pub fn check_capture(
        &self,
        thread: ThreadId,
        class: LockClass,
        lock_name: &str,
    ) -> Result<(), OsalError> {
        if !class.is_checked() {
            return Ok(());
        }

        let threads = self.threads.lock();
        let held = threads.get(&thread).map(|entry| entry.mask).unwrap_or(0);
        if held & class.junior_mask() == 0 {
            return Ok(());
        }

        tracing::error!(
            lock = lock_name,
            class = class.name(),
            thread = ?thread,
            held = %Self::mask_names(held),
            "lock precedence violation"
        );

        match self.policy {
            ViolationPolicy::Enforce => Err(OsalError::PrecedenceViolation {
                lock: lock_name.to_string(),
                held,
            }),
            ViolationPolicy::LogOnly => Ok(()),
        }
    }

    /// Record a successful first (non-recursive) capture of `class`.
    pub(crate) fn register_capture(&self, thread: ThreadId, class: LockClass) {
        if !class.is_checked() {
            return;
        }
        let mut threads = self.threads.lock();
        let entry = threads.entry(thread).or_default();
        entry.counts[class.rank()] += 1;
        entry.mask.set_bit(class.rank(), true);
    }

    /// Record that `thread` fully released one lock of `class`.
    ///
    /// The class bit clears only when no other lock of the same class
    /// remains held by the thread.
    pub(crate) fn release_capture(&self, thread: ThreadId, class: LockClass) {
        if !class.is_checked() {
            return;
        }
        let mut threads = self.threads.lock();
        let Some(entry) = threads.get_mut(&thread) else {
            tracing::warn!(class = class.name(), thread = ?thread,
                "release for a thread with no held-class record");
            return;
        };
        if entry.counts[class.rank()] == 0 {
            tracing::warn!(class = class.name(), thread = ?thread,
                "release of a class the thread does not hold");
            return;
        }
        entry.counts[class.rank()] -= 1;
        if entry.counts[class.rank()] == 0 {
            entry.mask.set_bit(class.rank(), false);
        }
        if entry.mask == 0 {
            threads.remove(&thread);
        }
    }

    /// The OR-mask of classes currently held by `thread`.
    pub fn held_mask(&self, thread: ThreadId) -> u64 {
        self.threads
            .lock()
            .get(&thread)
            .map(|entry| entry.mask)
            .unwrap_or(0)
    }

    /// Dump every thread's held-class set through the logging sink.
    pub fn dbg_dump(&self) {
        let threads = self.threads.lock();
        tracing::info!(policy = ?self.policy, threads = threads.len(), "lock registry");
        for (thread, entry) in threads.iter() {
            tracing::info!(thread = ?thread, held = %Self::mask_names(entry.mask),
                "held classes");
        }
    }

    fn mask_names(mask: u64) -> String {
        let names: Vec<&str> = LockClass::ranked()
            .into_iter()
            .filter(|class| mask.bit(class.rank()))
            .map(|class| class.name())
            .collect();
        if names.is_empty() {
            "<none>".to_string()
        } else {
            names.join("|")
        }
    }
}
