use chrono::NaiveDate;
use flowcast_core::calendar::day_cutoff;
use flowcast_core::model::DemandView;

/// Remaining work per remaining day.
///
/// - no deadline: `0`
/// - deadline today or already passed: the whole remaining scope is due now
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn flow_pressure(remaining_scope: u32, remaining_days: Option<i64>) -> f64 {
    match remaining_days {
        None => 0.0,
        Some(days) if days <= 0 => f64::from(remaining_scope),
        Some(days) => f64::from(remaining_scope) / days as f64,
    }
}

/// Share of the peer group's total pressure, as a percentage.
#[must_use]
pub fn relative_flow_pressure(entity_pressure: f64, total_pressure: f64) -> f64 {
    if total_pressure > 0.0 && total_pressure.is_finite() && entity_pressure.is_finite() {
        100.0 * entity_pressure / total_pressure
    } else {
        0.0
    }
}

/// Demands committed, unfinished and not discarded at the end of `as_of`.
#[must_use]
pub fn current_wip(demands: &[DemandView], as_of: NaiveDate) -> u32 {
    let cutoff = day_cutoff(as_of);
    let wip = demands.iter().filter(|demand| demand.is_wip_at(cutoff)).count();
    u32::try_from(wip).unwrap_or(u32::MAX)
}
