//! Time source abstraction.
//!
//! Everything in the engine works on epoch milliseconds handed in by the
//! caller. The [`Clock`] trait is the single place where "now" is read, so
//! tests can drive the engine with a [`ManualClock`].

use std::cell::Cell;

use chrono::{FixedOffset, Local, Offset, TimeZone, Utc};

pub trait Clock {
    /// Current instant in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Offset used to turn an instant into a local calendar date.
    fn utc_offset(&self) -> FixedOffset {
        Local
            .timestamp_millis_opt(self.now_ms())
            .single()
            .map(|dt| dt.offset().fix())
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: Cell<i64>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Start at `now_ms`, reporting dates in UTC.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Cell::new(now_ms),
            offset: Utc.fix(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.set(now_ms);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now_ms.set(self.now_ms.get().saturating_add(secs.saturating_mul(1000)));
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.set(self.now_ms.get().saturating_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.get()
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }

    fn utc_offset(&self) -> FixedOffset {
        (**self).utc_offset()
    }
}
