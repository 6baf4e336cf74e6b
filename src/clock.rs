//! Wall-clock source for cache timestamps
//!
//! Injected into the registry so retention and throttle windows can be tested
//! without sleeping.

use chrono::{DateTime, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current unix time in seconds
    fn unix_now(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    secs: parking_lot::Mutex<i64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(unix_secs: i64) -> Self {
        Self {
            secs: parking_lot::Mutex::new(unix_secs),
        }
    }

    pub fn advance(&self, secs: i64) {
        *self.secs.lock() += secs;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(*self.secs.lock(), 0).unwrap_or_default()
    }
}
