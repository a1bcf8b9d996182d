//! Time-based fetch gate
//!
//! Pure state: no timers, no channels. [`FetchScheduler`](super::FetchScheduler)
//! wraps one behind a mutex.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// In-flight and freshness bookkeeping for one data source
#[derive(Debug, Clone)]
pub struct FetchGate {
    /// Minimum time between fetch attempts
    interval: Duration,
    /// Last successful completion; `None` means never fetched
    last_fetch_at: Option<Instant>,
    /// Wall-clock time of the last success, for reporting
    last_fetch_wall: Option<DateTime<Utc>>,
    in_flight: bool,
    completed: u64,
    failed: u64,
}

impl FetchGate {
    /// Gate that allows an immediate first fetch
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fetch_at: None,
            last_fetch_wall: None,
            in_flight: false,
            completed: 0,
            failed: 0,
        }
    }

    /// Whether a regular fetch is allowed at `now`
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight
            && self
                .last_fetch_at
                .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Whether a fetch is allowed at `now`; `force` skips the interval check
    /// but never an attempt already in flight
    #[must_use]
    pub fn may_fetch(&self, now: Instant, force: bool) -> bool {
        if force {
            !self.in_flight
        } else {
            self.is_due(now)
        }
    }

    /// Time left until the interval elapses; zero when due or never fetched
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.last_fetch_at.map_or(Duration::ZERO, |last| {
            self.interval
                .saturating_sub(now.saturating_duration_since(last))
        })
    }

    /// Mark a fetch attempt as started
    pub const fn started(&mut self) {
        self.in_flight = true;
    }

    /// Mark the in-flight attempt as successful at `now`
    ///
    /// Returns `false` (and changes nothing) when no attempt was in flight.
    pub fn completed(&mut self, now: Instant) -> bool {
        if !self.in_flight {
            return false;
        }
        self.in_flight = false;
        self.last_fetch_at = Some(now);
        self.last_fetch_wall = Some(Utc::now());
        self.completed += 1;
        true
    }

    /// Mark the in-flight attempt as failed; freshness is not updated
    ///
    /// Returns `false` (and changes nothing) when no attempt was in flight.
    pub const fn failed(&mut self) -> bool {
        if !self.in_flight {
            return false;
        }
        self.in_flight = false;
        self.failed += 1;
        true
    }

    /// Pretend the last successful fetch happened at `at`
    pub const fn seed(&mut self, at: Instant) {
        self.last_fetch_at = Some(at);
    }

    /// Change the minimum time between attempts
    pub const fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Minimum time between attempts
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether an attempt is outstanding
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Monotonic time of the last success
    #[must_use]
    pub const fn last_fetch_at(&self) -> Option<Instant> {
        self.last_fetch_at
    }

    /// Wall-clock time of the last success
    #[must_use]
    pub const fn last_fetch_wall(&self) -> Option<DateTime<Utc>> {
        self.last_fetch_wall
    }

    /// Number of successful attempts
    #[must_use]
    pub const fn completed_count(&self) -> u64 {
        self.completed
    }

    /// Number of failed attempts
    #[must_use]
    pub const fn failed_count(&self) -> u64 {
        self.failed
    }
}
