//! Weekly throughput history.
//!
//! Weeks are ISO weeks (Monday start). The history is gap-free: a week in
//! range with no deliveries is present with a count of zero, because the
//! forecaster treats the series as an empirical distribution.

use chrono::{Duration, NaiveDate};
use flowcast_core::calendar::{day_cutoff, week_start};
use flowcast_core::model::DemandView;
use serde::{Deserialize, Serialize};

/// Which weeks a throughput history covers. Both variants end with the week
/// containing the as-of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "weeks")]
pub enum ThroughputWindow {
    /// The last `n` weeks; `Trailing(0)` is empty.
    Trailing(u32),
    /// From the week of the earliest demand onwards.
    AllHistory,
}

impl ThroughputWindow {
    /// `0` selects the whole history.
    #[must_use]
    pub const fn from_weeks(weeks: u32) -> Self {
        if weeks == 0 {
            Self::AllHistory
        } else {
            Self::Trailing(weeks)
        }
    }
}

/// Deliveries in the ISO week starting at `week_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCount {
    pub week_start: NaiveDate,
    pub count: u32,
}

/// Count deliveries per week, oldest first.
///
/// A demand counts in the week of its `finished_at` when it finished by the
/// end of `as_of`. Demands discarded after finishing still count: discarding
/// does not rewrite history.
#[must_use]
pub fn weekly_throughput(
    demands: &[DemandView],
    as_of: NaiveDate,
    window: ThroughputWindow,
) -> Vec<WeeklyCount> {
    let cutoff = day_cutoff(as_of);
    let last_week = week_start(as_of);

    let first_week = match window {
        ThroughputWindow::Trailing(0) => return Vec::new(),
        ThroughputWindow::Trailing(weeks) => {
            last_week - Duration::weeks(i64::from(weeks) - 1)
        }
        ThroughputWindow::AllHistory => {
            let earliest = demands
                .iter()
                .filter(|demand| demand.is_created_by(cutoff))
                .flat_map(|demand| {
                    let finished = demand
                        .finished_at
                        .filter(|_| demand.is_finished_by(cutoff));
                    std::iter::once(demand.created_at).chain(finished)
                })
                .min();
            match earliest {
                Some(at) => week_start(at.date_naive()).min(last_week),
                None => return Vec::new(),
            }
        }
    };

    let span = week_index(first_week, last_week).unwrap_or(0) + 1;
    let mut history: Vec<WeeklyCount> = (0..span)
        .map(|offset| WeeklyCount {
            week_start: first_week + Duration::weeks(i64::try_from(offset).unwrap_or(i64::MAX)),
            count: 0,
        })
        .collect();

    for demand in demands.iter().filter(|d| d.is_finished_by(cutoff)) {
        let Some(finished_at) = demand.finished_at else {
            continue;
        };
        let Some(index) = week_index(first_week, week_start(finished_at.date_naive())) else {
            continue;
        };
        if let Some(bucket) = history.get_mut(index) {
            bucket.count = bucket.count.saturating_add(1);
        }
    }

    tracing::trace!(%as_of, weeks = history.len(), "bucketed weekly throughput");
    history
}

/// The bare counts of a history, oldest first.
#[must_use]
pub fn counts(history: &[WeeklyCount]) -> Vec<u32> {
    history.iter().map(|week| week.count).collect()
}

/// Total deliveries across a history.
#[must_use]
pub fn total(history: &[WeeklyCount]) -> u32 {
    history
        .iter()
        .fold(0_u32, |acc, week| acc.saturating_add(week.count))
}

/// Zero-based week offset of `week` from `first`; `None` before `first`.
fn week_index(first: NaiveDate, week: NaiveDate) -> Option<usize> {
    let days = (week - first).num_days();
    usize::try_from(days / 7).ok().filter(|_| days >= 0)
}
