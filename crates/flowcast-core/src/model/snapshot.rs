use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::EntityRef;

/// Unique key of a consolidation snapshot: one row per entity per calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub entity: EntityRef,
    pub consolidation_date: NaiveDate,
}

impl SnapshotKey {
    #[must_use]
    pub const fn new(entity: EntityRef, consolidation_date: NaiveDate) -> Self {
        Self {
            entity,
            consolidation_date,
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.consolidation_date)
    }
}

/// Scope and work-in-progress counts as of the consolidation date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeFigures {
    pub remaining_scope: u32,
    pub current_wip: u32,
    pub wip_limit: u32,
    /// Demands created and not discarded.
    pub demands_count: u32,
    pub delivered_count: u32,
    pub discarded_count: u32,
    pub effort_delivered_upstream: f64,
    pub effort_delivered_downstream: f64,
}

/// Lead-time distribution of delivered demands, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeFigures {
    pub sample_size: u32,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p75: f64,
    pub p80: f64,
    pub average: f64,
    pub std_dev: f64,
    pub histogram_bin_min: f64,
    pub histogram_bin_max: f64,
    pub histogram_counts: Vec<u32>,
}

/// Rolling weekly throughput, oldest week first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputFigures {
    pub weekly: Vec<u32>,
    /// Total delivered inside the rolling window.
    pub project_throughput: u32,
}

/// Monte-Carlo forecast summary and the derived deadline odds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastFigures {
    /// `false` when there was no usable throughput history.
    pub forecast_known: bool,
    pub trials: u32,
    pub monte_carlo_weeks_min: f64,
    pub monte_carlo_weeks_max: f64,
    pub monte_carlo_weeks_mean: f64,
    pub monte_carlo_weeks_std_dev: f64,
    pub monte_carlo_weeks_p80: f64,
    pub weeks_to_deadline: Option<u32>,
    pub odds_to_deadline: f64,
    pub operational_risk: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureFigures {
    pub flow_pressure: f64,
    /// Percentage (0–100) of the peer group's total pressure.
    pub relative_flow_pressure: f64,
}

/// Period-boundary flags used by downstream weekly/monthly/yearly rollups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupMarkers {
    pub last_data_in_week: bool,
    pub last_data_in_month: bool,
    pub last_data_in_year: bool,
}

/// A daily frozen statistical summary for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationSnapshot {
    pub key: SnapshotKey,
    pub scope: ScopeFigures,
    pub lead_time: LeadTimeFigures,
    pub throughput: ThroughputFigures,
    pub forecast: ForecastFigures,
    pub pressure: PressureFigures,
    pub rollup: RollupMarkers,
}

impl ConsolidationSnapshot {
    /// Every float is finite and every ratio lies in `[0, 1]`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let floats = [
            self.scope.effort_delivered_upstream,
            self.scope.effort_delivered_downstream,
            self.lead_time.min,
            self.lead_time.max,
            self.lead_time.p25,
            self.lead_time.p75,
            self.lead_time.p80,
            self.lead_time.average,
            self.lead_time.std_dev,
            self.lead_time.histogram_bin_min,
            self.lead_time.histogram_bin_max,
            self.forecast.monte_carlo_weeks_min,
            self.forecast.monte_carlo_weeks_max,
            self.forecast.monte_carlo_weeks_mean,
            self.forecast.monte_carlo_weeks_std_dev,
            self.forecast.monte_carlo_weeks_p80,
            self.forecast.odds_to_deadline,
            self.forecast.operational_risk,
            self.pressure.flow_pressure,
            self.pressure.relative_flow_pressure,
        ];
        let unit = 0.0..=1.0;

        floats.iter().all(|value| value.is_finite())
            && unit.contains(&self.forecast.odds_to_deadline)
            && unit.contains(&self.forecast.operational_risk)
    }
}

/// A persisted snapshot together with its row bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub snapshot: ConsolidationSnapshot,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}
