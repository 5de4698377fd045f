// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! Shared vocabulary types for the swx switch SDK core.
//!
//! Everything in this crate is plain data: bounded-wait arguments, the
//! global lock-precedence list, switch identifiers and timestamps. The
//! machinery that consumes these lives in `swx_osal` and `swx_sm`.

pub mod class;
pub mod switch;
pub mod time;
pub mod wait;

pub use class::LockClass;
pub use switch::SwitchId;
pub use time::Timestamp;
pub use wait::Wait;
