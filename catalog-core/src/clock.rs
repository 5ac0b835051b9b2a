//! Wall-clock source for lock timestamps
//!
//! Lock rows store `acquired_at` / `heartbeat_at` as store-local wall-clock text in the
//! `YYYY-MM-DD HH:MM:SS` format. Lease age is always computed as a whole-second delta
//! between two such values, so sub-second precision is dropped at the source.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, Timelike};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Format used for every timestamp persisted in `app_writer_lock`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of "now" for the lock manager
pub trait Clock: Send + Sync {
    /// Current store-local wall-clock time, truncated to whole seconds
    fn now(&self) -> NaiveDateTime;
}

/// Local system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_seconds(Local::now().naive_local())
    }
}

/// Manually driven clock for deterministic lease tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(truncate_to_seconds(start))),
        }
    }

    /// Create a clock frozen at the current local time
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let step = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += step;
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: NaiveDateTime) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = truncate_to_seconds(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Render a timestamp the way lock rows store it
pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored lock timestamp; `None` when the text is not in the expected format
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// Whole seconds elapsed from `since` to `now` (negative if `since` is in the future)
pub fn elapsed_secs(since: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (now - since).num_seconds()
}

fn truncate_to_seconds(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}
