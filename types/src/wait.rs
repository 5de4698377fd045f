// Copyright (C) Microsoft Corporation. All rights reserved.

//! Bounded-wait argument passed to every lock capture call.

use std::time::Duration;
use std::time::Instant;

/// How long a capture call may block.
///
/// Every blocking entry point in the SDK core takes a [Wait] so that no
/// caller can block unboundedly by accident. [Wait::Forever] is the
/// explicit opt-in for an unbounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Block until the resource becomes available.
    Forever,

    /// Do not block at all; fail immediately if the resource is busy.
    NoWait,

    /// Block for at most the given duration.
    For(Duration),
}

impl Wait {
    /// Absolute deadline for this wait, measured from now.
    ///
    /// `None` means no deadline (wait forever). [Wait::NoWait] yields a
    /// deadline that is already in the past for any subsequent check.
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Wait::Forever => None,
            Wait::NoWait => Some(Instant::now()),
            Wait::For(timeout) => Some(Instant::now() + timeout),
        }
    }

    /// Whether this wait allows blocking at all.
    pub fn blocks(self) -> bool {
        !matches!(self, Wait::NoWait)
    }
}
