//! Wall-clock source for the scheduler, in the reference timezone.

use std::sync::{Mutex, PoisonError};

use chrono::{Duration, FixedOffset, NaiveDateTime, Offset, Utc};

/// Supplies "now" as a naive wall-clock value comparable with task due instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Offset that [`Clock::now`] is expressed in.
    fn offset(&self) -> FixedOffset {
        Utc.fix()
    }

    /// RFC 3339 stamp of [`Clock::now`], used for `created_at` columns.
    fn timestamp(&self) -> String {
        let now = self.now();
        now.and_local_timezone(self.offset())
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| now.and_utc().to_rfc3339())
    }
}

/// The system clock shifted into a fixed reference offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
