//! Time sources.
//!
//! Durations and cooldowns in Runeforge are timestamp comparisons evaluated at
//! call time, so the only thing the core needs from the host is "what time is
//! it now", in seconds.

use std::time::Instant;

/// Seconds since an arbitrary, host-defined epoch.
pub type Timestamp = f64;

/// A wall-clock or tick source.
pub trait Clock {
    /// Current time in seconds.
    fn now(&self) -> Timestamp;
}

/// A clock advanced explicitly by the caller.
///
/// Used by fixed-rate hosts that already count ticks, and by tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualClock {
    now: Timestamp,
}

impl ManualClock {
    /// Creates a clock at the given time.
    #[must_use]
    pub const fn at(now: Timestamp) -> Self {
        Self { now }
    }

    /// Advances the clock by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.now += dt;
    }

    /// Jumps to an absolute time.
    pub fn set(&mut self, now: Timestamp) {
        self.now = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now
    }
}

/// Monotonic clock measuring seconds since its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Starts a new clock at zero.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_secs_f64()
    }
}

/// Returns true once at least `duration` seconds have passed since `since`.
///
/// A non-positive duration has always elapsed.
#[must_use]
pub fn has_elapsed(now: Timestamp, since: Timestamp, duration: f64) -> bool {
    duration <= 0.0 || now - since >= duration
}
