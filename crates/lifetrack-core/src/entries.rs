//! Completed focus sessions.
//!
//! A [`FocusEntry`] is written once, when a focus phase completes, and is
//! never modified afterwards. The profile/XP side of the application only
//! reads them, summing minutes per month.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusEntry {
    pub id: String,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub duration_minutes: u32,
    pub created_at_epoch_ms: i64,
}

impl FocusEntry {
    /// `YYYY-MM` bucket of this entry.
    pub fn month_key(&self) -> &str {
        self.date.get(..7).unwrap_or(&self.date)
    }
}

/// Turns completed focus phases into entries.
pub struct EntryRecorder<C> {
    clock: C,
}

impl<C: Clock> EntryRecorder<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Build a new entry with a fresh id and creation time.
    pub fn record(&self, duration_minutes: u32, date_key: &str) -> FocusEntry {
        FocusEntry {
            id: Uuid::new_v4().to_string(),
            date: date_key.to_string(),
            duration_minutes,
            created_at_epoch_ms: self.clock.now_ms(),
        }
    }

    /// Record a completion that happened at `completed_at_epoch_ms`, dated
    /// in the clock's local offset.
    pub fn record_completion(&self, duration_minutes: u32, completed_at_epoch_ms: i64) -> FocusEntry {
        let key = date_key(completed_at_epoch_ms, self.clock.utc_offset());
        self.record(duration_minutes, &key)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Local `YYYY-MM-DD` for an epoch instant.
pub fn date_key(epoch_ms: i64, offset: FixedOffset) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.with_timezone(&offset).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

/// Sum of focus minutes per `YYYY-MM`, skipping malformed dates.
pub fn monthly_minutes(entries: &[FocusEntry]) -> BTreeMap<String, u64> {
    let mut months = BTreeMap::new();
    for entry in entries {
        if NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").is_err() {
            tracing::warn!(id = %entry.id, date = %entry.date, "skipping entry with malformed date");
            continue;
        }
        *months.entry(entry.month_key().to_string()).or_insert(0) += u64::from(entry.duration_minutes);
    }
    months
}
