//! Wall-clock access and calendar-day arithmetic.
//!
//! All streak math runs on calendar dates in a single configured zone. Day gaps
//! are computed between `NaiveDate`s, so daylight-saving shifts never yield a
//! fractional or skipped day.

use std::str::FromStr;
#[cfg(test)]
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Which zone decides where one calendar day ends and the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    /// The device's local time zone.
    #[default]
    Local,
    /// Coordinated universal time.
    Utc,
}

impl DayBoundary {
    /// Truncate an instant to its calendar day in this zone.
    pub fn calendar_day(&self, ts: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Local => ts.with_timezone(&Local).date_naive(),
            DayBoundary::Utc => ts.date_naive(),
        }
    }
}

impl FromStr for DayBoundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DayBoundary::Local),
            "utc" => Ok(DayBoundary::Utc),
            other => Err(format!("unknown day boundary '{}'", other)),
        }
    }
}

/// Whole calendar days from `earlier` to `later`. Negative under clock skew.
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
