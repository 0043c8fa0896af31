//! Wall-clock abstraction.
//!
//! The tracker needs "now" for trip durations and the local time of day for the
//! working-hours check. Hosts use [`SystemClock`]; replays and tests drive a
//! [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch milliseconds.
    fn now_millis(&self) -> i64;

    /// Current time in the local time zone.
    fn now_local(&self) -> DateTime<Local> {
        local_time(self.now_millis())
    }
}

/// Convert epoch milliseconds to local time, falling back to the epoch for
/// out-of-range values.
pub fn local_time(millis: i64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(millis)
        .earliest()
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local))
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Start at the given local date and time.
    ///
    /// Returns `None` when the local time does not exist (DST gap).
    pub fn at_local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        let time = Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()?;
        Some(Self::new(time.timestamp_millis()))
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}
