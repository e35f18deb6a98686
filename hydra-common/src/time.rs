//! Timestamp utilities: injectable clock and the "today" boundary

use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Source of "now" for the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut guard) = self.instant.lock() {
            *guard = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.instant.lock() {
            *guard = *guard + by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Where a user's day starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBoundary {
    /// Host timezone midnight
    Local,
    /// Midnight at a fixed UTC offset (seconds east of UTC)
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Build from `day.utc_offset_minutes`; invalid offsets fall back to local
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .map(DayBoundary::Fixed)
            .unwrap_or(DayBoundary::Local)
    }

    /// UTC instant of the midnight that starts the day containing `now`
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DayBoundary::Local => start_of_day_in(now, &Local),
            DayBoundary::Fixed(offset) => start_of_day_in(now, offset),
        }
    }

    /// `[start, start + 24h)` for the day containing `now`
    pub fn today(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_of_day(now);
        (start, start + Duration::hours(24))
    }
}

/// Midnight of `now`'s calendar date in `tz`, expressed in UTC
///
/// On DST gaps where midnight does not exist, the earliest valid instant of
/// the day is used.
pub fn start_of_day_in<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local_date = now.with_timezone(tz).date_naive();
    let Some(midnight) = local_date.and_hms_opt(0, 0, 0) else {
        return now;
    };
    match tz.from_local_datetime(&midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        None => {
            // Midnight skipped by a DST jump: the day starts one hour later
            let shifted = midnight + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now)
        }
    }
}
