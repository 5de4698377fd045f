// Copyright (C) Microsoft Corporation. All rights reserved.

//! Timestamp arithmetic for history records and diagnostics.

use std::fmt;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// A microsecond-resolution point in time.
///
/// The epoch a [Timestamp] is measured from depends on how it was
/// produced: [Timestamp::now_wall] measures from the Unix epoch,
/// [Timestamp::since] from whatever reference instant the caller supplies
/// (engine start, last history clear). Comparison and arithmetic are only
/// meaningful between timestamps sharing an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    micros: u64,
}

impl Timestamp {
    /// The epoch itself.
    pub const ZERO: Timestamp = Timestamp { micros: 0 };

    /// Construct from raw microseconds.
    pub fn from_micros(micros: u64) -> Timestamp {
        Timestamp { micros }
    }

    /// Current wall-clock time, measured from the Unix epoch.
    pub fn now_wall() -> Timestamp {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp::from_duration(elapsed)
    }

    /// Time elapsed since `reference`, as a timestamp with `reference` as
    /// its epoch.
    pub fn since(reference: Instant) -> Timestamp {
        Timestamp::from_duration(reference.elapsed())
    }

    fn from_duration(elapsed: Duration) -> Timestamp {
        Timestamp {
            micros: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        }
    }

    /// Raw microsecond count.
    pub fn as_micros(self) -> u64 {
        self.micros
    }

    /// This timestamp as a duration since its epoch.
    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.micros)
    }

    /// Add a duration, `None` on overflow.
    pub fn checked_add(self, delta: Duration) -> Option<Timestamp> {
        let delta = u64::try_from(delta.as_micros()).ok()?;
        Some(Timestamp {
            micros: self.micros.checked_add(delta)?,
        })
    }

    /// Subtract a duration, `None` on underflow.
    pub fn checked_sub(self, delta: Duration) -> Option<Timestamp> {
        let delta = u64::try_from(delta.as_micros()).ok()?;
        Some(Timestamp {
            micros: self.micros.checked_sub(delta)?,
        })
    }

    /// Interval between two timestamps sharing an epoch, `None` if
    /// `earlier` is in fact later.
    pub fn delta_since(self, earlier: Timestamp) -> Option<Duration> {
        self.micros
            .checked_sub(earlier.micros)
            .map(Duration::from_micros)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.micros / 1_000_000, self.micros % 1_000_000)
    }
}

/// Sleep until `deadline`, re-sleeping across early wakeups.
pub fn delay_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(deadline - now);
    }
}
