// src/clock.rs

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// Wall-clock source. `today` is the local calendar date, which is what week
/// keys are computed from.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Settable clock. The stored time is treated as both the local and the UTC
/// reading.
#[derive(Clone)]
pub struct TestClock {
    current_time: Arc<Mutex<NaiveDateTime>>,
}

impl TestClock {
    /// Panics on a malformed `YYYY-MM-DD HH:MM:SS` string; intended for fixtures.
    pub fn new(datetime_str: &str) -> Self {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|e| panic!("Failed to parse datetime '{}': {}", datetime_str, e));
        Self {
            current_time: Arc::new(Mutex::new(dt)),
        }
    }

    pub fn set_time(&self, datetime_str: &str) {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|e| panic!("Failed to parse datetime '{}': {}", datetime_str, e));
        *self.lock() = dt;
    }

    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        self.current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.lock())
    }

    fn today(&self) -> NaiveDate {
        self.lock().date()
    }
}
