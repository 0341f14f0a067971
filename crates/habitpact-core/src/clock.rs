//! Injected clock abstraction.
//!
//! The engine never reads the wall clock directly -- sweeps and transitions
//! take their notion of "now" from a [`Clock`] so the state machines can be
//! driven in tests without real time passing.

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current time for the engine.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Today as a calendar date (UTC). All gap arithmetic is whole days.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests; advance it explicitly.
#[derive(Debug)]
pub struct FixedClock {
    now: std::cell::Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::cell::Cell::new(now),
        }
    }

    /// Pin the clock to midnight UTC of the given date.
    pub fn at_date(date: NaiveDate) -> Self {
        let now = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance_days(&self, days: i64) {
        self.now.set(self.now.get() + chrono::Duration::days(days));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
