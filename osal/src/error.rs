// Copyright (C) Microsoft Corporation. All rights reserved.

//! OS abstraction layer - Error module

use thiserror::Error;

/// Errors reported by the lock package.
///
/// [OsalError::Timeout] is an expected outcome of a bounded wait and is
/// kept distinct from the usage errors; callers decide whether to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OsalError {
    /// The bounded wait expired before the lock became available.
    #[error("timed out waiting for lock")]
    Timeout,

    /// Capturing the lock would violate the global precedence order.
    #[error("precedence violation capturing {lock}: held set {held:#018x}")]
    PrecedenceViolation {
        /// Name of the lock whose capture was refused.
        lock: String,
        /// The calling thread's held-class mask at the time of the check.
        held: u64,
    },

    /// The calling thread does not own the lock it tried to release.
    #[error("lock released by a thread that does not own it")]
    NotOwner,

    /// The calling thread holds no read or write lock on this instance.
    #[error("lock not held by the calling thread")]
    NotHeld,

    /// A write capture by a thread already holding only a read lock would
    /// self-deadlock; use promotion instead.
    #[error("write capture while holding a read lock would deadlock")]
    WouldDeadlock,

    /// The calling thread already holds the write lock.
    #[error("calling thread already holds the write lock")]
    AlreadyWriter,

    /// Another thread already holds a pending promotion request on this
    /// lock.
    #[error("read-to-write promotion already requested by another thread")]
    PromotionContested,
}
