//! Date arithmetic shared by the read model, statistics, and the builder.
//!
//! All snapshot dates are UTC calendar dates. "As of `date`" means every event
//! stamped before the following midnight.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::model::RollupMarkers;

/// Exclusive instant closing `date`: midnight UTC of the next day.
#[must_use]
pub fn day_cutoff(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::days(1)
}

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Whole weeks from `from` to `deadline`, rounded up; zero once the deadline
/// is today or behind us.
#[must_use]
pub fn weeks_until(from: NaiveDate, deadline: NaiveDate) -> u32 {
    let days = (deadline - from).num_days();
    if days <= 0 {
        return 0;
    }
    u32::try_from((days + 6) / 7).unwrap_or(u32::MAX)
}

/// Period-boundary markers for a consolidation date.
#[must_use]
pub fn rollup_markers(date: NaiveDate) -> RollupMarkers {
    let last_in_month = date
        .succ_opt()
        .is_none_or(|next| next.month() != date.month());
    RollupMarkers {
        last_data_in_week: date.weekday() == Weekday::Sun,
        last_data_in_month: last_in_month,
        last_data_in_year: date.month() == 12 && date.day() == 31,
    }
}

/// Error returned for a range whose start is after its end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date range: {start} is after {end}")]
pub struct DateRangeError {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// # Errors
    ///
    /// Returns [`DateRangeError`] when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of dates in the range (never zero).
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Dates in chronological order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |day| *day <= self.end)
    }
}
