// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! OS abstraction services for the swx switch SDK.
//!
//! This crate provides the synchronization core every SDK subsystem builds
//! on: a precedence-checked recursive mutex wrapper ([OsalLock]), a
//! multi-reader/single-writer lock with writer preference and read-to-write
//! promotion ([OsalRwLock]), and the process-wide [LockRegistry] that
//! enforces the global lock acquisition order defined by
//! [swx_types::LockClass].
//!
//! Worker threads (interrupt handling, MAC-table maintenance, timers,
//! packet receive) contend on these locks; the registry guarantees no two
//! threads can capture two locks in conflicting orders anywhere in the
//! process.

pub mod error;
pub mod lock;
pub mod registry;
pub mod rwlock;

pub use error::OsalError;
pub use lock::OsalLock;
pub use registry::LockRegistry;
pub use registry::ViolationPolicy;
pub use rwlock::OsalRwLock;
pub use rwlock::RwCounters;
