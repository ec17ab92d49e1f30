//! Wall-clock aligned scheduling.
//!
//! Cycles fire on exact multiples of the poll interval counted from local
//! midnight (with the default 5 minutes: :00, :05, :10, ...), no matter when
//! the process started or how long the previous cycle took. Sleeping a fixed
//! interval after each cycle would drift by the cycle duration every time.
//!
//! # Clock injection
//! `next_boundary` and `wait_until` take `now` as a parameter, so the
//! alignment arithmetic is deterministic in tests.

use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};

use crate::shutdown::Shutdown;

/// Default poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

const SECS_PER_DAY: u64 = 86_400;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval_secs: u64,
}

impl Scheduler {
    /// `interval` is clamped to at least one second.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_secs: interval.as_secs().max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// First aligned instant strictly after `now`.
    ///
    /// Floors the time of day to the interval, drops seconds and sub-seconds
    /// below it, then adds one interval.
    pub fn next_boundary(&self, now: NaiveDateTime) -> NaiveDateTime {
        let midnight = now.date().and_time(chrono::NaiveTime::MIN);
        let secs_of_day = u64::from(now.num_seconds_from_midnight());
        let floored = secs_of_day - secs_of_day % self.interval_secs;
        let next = (floored + self.interval_secs) as i64;
        midnight + chrono::Duration::seconds(next)
    }

    /// Blocks until `target`, or until shutdown is requested.
    ///
    /// A target already in the past returns immediately.
    pub fn wait_until(
        &self,
        target: NaiveDateTime,
        now: NaiveDateTime,
        shutdown: &Shutdown,
    ) -> WaitOutcome {
        let wait = time_until(target, now);
        if shutdown.wait_timeout(wait) {
            WaitOutcome::Interrupted
        } else {
            WaitOutcome::Reached
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Next 5-minute boundary strictly after `now`.
pub fn next_boundary(now: NaiveDateTime) -> NaiveDateTime {
    Scheduler::default().next_boundary(now)
}

/// Non-negative duration from `now` to `target`.
pub fn time_until(target: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Whether `interval_secs` tiles a day exactly, which keeps boundaries at
/// the same clock positions every day.
pub fn divides_day(interval_secs: u64) -> bool {
    interval_secs > 0 && SECS_PER_DAY % interval_secs == 0
}

/// Local wall clock, truncated to whole seconds.
pub fn local_now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
