//! ISO calendar weeks.
//!
//! Streaks count weeks, so every ledger row and every streak transition is keyed by
//! the ISO week of the relevant instant. Weeks start on Monday 00:00 UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// An ISO calendar week, represented by its Monday.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekKey(NaiveDate);

impl ValueObject for WeekKey {}

impl WeekKey {
    /// Week containing the given calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        let offset = i64::from(date.weekday().num_days_from_monday());
        Self(date - Duration::days(offset))
    }

    /// Week containing the given instant (UTC).
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self::from_date(at.date_naive())
    }

    /// Monday of this week.
    pub fn monday(&self) -> NaiveDate {
        self.0
    }

    /// First instant of this week (Monday 00:00 UTC).
    pub fn start(&self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant of the following week.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn next(&self) -> Self {
        self.offset(1)
    }

    pub fn prev(&self) -> Self {
        self.offset(-1)
    }

    pub fn offset(&self, weeks: i64) -> Self {
        Self(self.0 + Duration::weeks(weeks))
    }

    /// Signed number of whole weeks from `earlier` to `self`.
    pub fn weeks_since(&self, earlier: WeekKey) -> i64 {
        (self.0 - earlier.0).num_days() / 7
    }

    /// ISO `(year, week)` pair, e.g. `(2026, 42)`.
    pub fn iso(&self) -> (i32, u32) {
        let iso = self.0.iso_week();
        (iso.year(), iso.week())
    }
}

impl core::fmt::Display for WeekKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (year, week) = self.iso();
        write!(f, "{year}-W{week:02}")
    }
}
