//! A pluggable source of wall-clock time.
//!
//! Liveness and heartbeat logic (the worker registry's reap/active checks, the heartbeat
//! and reaper loops) all read time through [`TimeProvider`] instead of calling
//! `SystemTime::now()`/`chrono::Utc::now()` directly, so tests can advance time
//! deterministically with [`MockProvider`] instead of sleeping in real time.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// A point in time, represented as nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// Construct a `Time` from nanoseconds since the Unix epoch.
    pub fn from_timestamp_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the Unix epoch.
    pub fn timestamp_nanos(&self) -> i64 {
        self.0
    }

    /// The underlying `chrono` representation, in UTC.
    pub fn date_time(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Duration elapsed between `earlier` and `self`. Saturates to zero if `earlier` is
    /// later than `self`.
    pub fn checked_duration_since(&self, earlier: Time) -> Option<Duration> {
        let delta_nanos = self.0 - earlier.0;
        if delta_nanos < 0 {
            None
        } else {
            Some(Duration::from_nanos(delta_nanos as u64))
        }
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t.timestamp_nanos())
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.as_nanos() as i64)
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self(self.0 - rhs.as_nanos() as i64)
    }
}

/// Something that can provide the current time.
///
/// Implementations must be cheap to call repeatedly (no I/O) and safe to share across
/// threads; the scheduler's reaper, the worker's heartbeat loop, and the placement oracle
/// all hold a `Arc<dyn TimeProvider>` and call [`now`](Self::now) on every tick.
pub trait TimeProvider: Debug + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// A [`TimeProvider`] that reads the real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider {}

impl SystemProvider {
    /// Create a new `SystemProvider`.
    pub fn new() -> Self {
        Self {}
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Utc::now().into()
    }
}

/// A [`TimeProvider`] whose value is set explicitly by the caller, for deterministic
/// tests of liveness/heartbeat logic.
#[derive(Debug)]
pub struct MockProvider {
    now: Mutex<Time>,
}

impl MockProvider {
    /// Create a mock provider that starts out reporting `start`.
    pub fn new(start: Time) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Overwrite the time this provider reports.
    pub fn set(&self, time: Time) {
        *self.now.lock() = time;
    }

    /// Advance the time this provider reports by `duration`, returning the new value.
    pub fn inc(&self, duration: Duration) -> Time {
        let mut guard = self.now.lock();
        *guard = *guard + duration;
        *guard
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_advances_explicitly() {
        let start = Time::from_timestamp_nanos(0);
        let mock = MockProvider::new(start);
        assert_eq!(mock.now(), start);

        let later = mock.inc(Duration::from_secs(5));
        assert_eq!(mock.now(), later);
        assert_eq!(
            later.checked_duration_since(start),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn duration_since_saturates_on_reversed_times() {
        let earlier = Time::from_timestamp_nanos(10);
        let later = Time::from_timestamp_nanos(5);
        assert_eq!(later.checked_duration_since(earlier), None);
    }
}
