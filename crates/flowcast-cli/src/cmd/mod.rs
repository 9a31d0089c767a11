pub mod backfill;
pub mod batch;
pub mod consolidate;
pub mod import;
pub mod init;
pub mod show;

use chrono::{NaiveDate, Utc};
use flowcast_core::config::{EffectiveConfig, PROJECT_DIR, resolve_config};
use flowcast_core::db;
use flowcast_core::error::ErrorCode;
use flowcast_core::model::{ConsolidationSnapshot, EntityKind, EntityRef};
use flowcast_engine::{BuilderSettings, ConsolidationError};
use flowcast_stats::forecast::MonteCarloForecaster;
use rusqlite::Connection;
use std::io::{self, Write};
use std::path::Path;

use crate::output::{CliError, OutputMode, days, percent, pretty_kv, pretty_section, render_error};

/// Render `error` and return it as the command's failure.
pub fn fail<T>(output: OutputMode, error: &CliError) -> anyhow::Result<T> {
    render_error(output, error)?;
    anyhow::bail!("{}", error.message)
}

/// Load the effective config of an initialized project.
pub fn load_project(project_root: &Path, output: OutputMode) -> anyhow::Result<EffectiveConfig> {
    if !project_root.join(PROJECT_DIR).is_dir() {
        return fail(
            output,
            &CliError::from_code(
                ErrorCode::NotInitialized,
                format!("no {PROJECT_DIR}/ directory in {}", project_root.display()),
            ),
        );
    }

    match resolve_config(project_root) {
        Ok(config) => Ok(config),
        Err(err) => fail(
            output,
            &CliError::from_code(ErrorCode::ConfigParseError, format!("{err:#}")),
        ),
    }
}

pub fn open_connection(config: &EffectiveConfig, output: OutputMode) -> anyhow::Result<Connection> {
    match db::open_store(&config.database_path) {
        Ok(conn) => Ok(conn),
        Err(err) => fail(
            output,
            &CliError::from_code(ErrorCode::CorpusUnavailable, format!("{err:#}")),
        ),
    }
}

pub fn parse_entity(kind: &str, id: &str, output: OutputMode) -> anyhow::Result<EntityRef> {
    let kind = match kind.parse::<EntityKind>() {
        Ok(kind) => kind,
        Err(err) => {
            return fail(
                output,
                &CliError::from_code(ErrorCode::InvalidEnumValue, err.to_string()),
            );
        }
    };
    if id.trim().is_empty() {
        return fail(
            output,
            &CliError::from_code(ErrorCode::EntityNotFound, "entity id must not be empty"),
        );
    }
    Ok(EntityRef::new(kind, id))
}

pub fn forecaster(config: &EffectiveConfig) -> MonteCarloForecaster {
    let forecast = &config.project.forecast;
    MonteCarloForecaster::new(forecast.max_weeks_per_trial, forecast.parallel)
}

pub fn settings(config: &EffectiveConfig) -> BuilderSettings {
    BuilderSettings::from(&config.project)
}

pub fn consolidation_error(err: &ConsolidationError) -> CliError {
    CliError::from_code(err.code(), err.to_string())
}

/// Today's date in UTC, the default consolidation date.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ---------------------------------------------------------------------------
// Snapshot rendering shared by consolidate/backfill/show
// ---------------------------------------------------------------------------

/// One tab-separated row: entity, date, remaining scope, wip, p80 weeks,
/// odds, risk, flow pressure.
pub fn snapshot_text_row(snapshot: &ConsolidationSnapshot, w: &mut dyn Write) -> io::Result<()> {
    let p80 = if snapshot.forecast.forecast_known {
        format!("{:.1}", snapshot.forecast.monte_carlo_weeks_p80)
    } else {
        "-".to_string()
    };
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{:.3}\t{:.3}\t{:.3}",
        snapshot.key.entity,
        snapshot.key.consolidation_date,
        snapshot.scope.remaining_scope,
        snapshot.scope.current_wip,
        p80,
        snapshot.forecast.odds_to_deadline,
        snapshot.forecast.operational_risk,
        snapshot.pressure.flow_pressure,
    )
}

pub fn snapshot_pretty(snapshot: &ConsolidationSnapshot, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(
        w,
        &format!("{} @ {}", snapshot.key.entity, snapshot.key.consolidation_date),
    )?;
    pretty_flow(snapshot, w)?;
    pretty_forecast(snapshot, w)?;

    let rollup = &snapshot.rollup;
    let marks: Vec<&str> = [
        (rollup.last_data_in_week, "week"),
        (rollup.last_data_in_month, "month"),
        (rollup.last_data_in_year, "year"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect();
    pretty_kv(
        w,
        "closes",
        if marks.is_empty() {
            "-".to_string()
        } else {
            marks.join(", ")
        },
    )
}

fn pretty_flow(snapshot: &ConsolidationSnapshot, w: &mut dyn Write) -> io::Result<()> {
    let scope = &snapshot.scope;
    let wip_limit = if scope.wip_limit == 0 {
        "-".to_string()
    } else {
        scope.wip_limit.to_string()
    };
    pretty_kv(w, "remaining scope", scope.remaining_scope.to_string())?;
    pretty_kv(w, "wip", format!("{} (limit {wip_limit})", scope.current_wip))?;
    pretty_kv(
        w,
        "demands",
        format!(
            "{} ({} delivered, {} discarded)",
            scope.demands_count, scope.delivered_count, scope.discarded_count
        ),
    )?;

    let lead = &snapshot.lead_time;
    if lead.sample_size == 0 {
        pretty_kv(w, "lead time", "no deliveries")?;
    } else {
        pretty_kv(
            w,
            "lead time",
            format!(
                "p80 {} avg {} ({} samples)",
                days(lead.p80),
                days(lead.average),
                lead.sample_size
            ),
        )?;
    }

    let weekly: Vec<String> = snapshot
        .throughput
        .weekly
        .iter()
        .map(ToString::to_string)
        .collect();
    pretty_kv(
        w,
        "throughput",
        format!(
            "{} [{}]",
            snapshot.throughput.project_throughput,
            weekly.join(" ")
        ),
    )
}

fn pretty_forecast(snapshot: &ConsolidationSnapshot, w: &mut dyn Write) -> io::Result<()> {
    let forecast = &snapshot.forecast;
    if forecast.forecast_known {
        pretty_kv(
            w,
            "forecast",
            format!(
                "p80 {:.1} weeks (min {:.0}, max {:.0}, {} trials)",
                forecast.monte_carlo_weeks_p80,
                forecast.monte_carlo_weeks_min,
                forecast.monte_carlo_weeks_max,
                forecast.trials
            ),
        )?;
    } else {
        pretty_kv(w, "forecast", "unknown (no throughput history)")?;
    }
    pretty_kv(
        w,
        "deadline",
        forecast
            .weeks_to_deadline
            .map_or_else(|| "none".to_string(), |weeks| format!("{weeks} weeks")),
    )?;
    pretty_kv(w, "odds", percent(forecast.odds_to_deadline))?;
    pretty_kv(w, "risk", percent(forecast.operational_risk))?;
    pretty_kv(
        w,
        "flow pressure",
        format!(
            "{:.2} ({:.1}% of peers)",
            snapshot.pressure.flow_pressure, snapshot.pressure.relative_flow_pressure
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcast_core::model::{
        ForecastFigures, LeadTimeFigures, PressureFigures, RollupMarkers, ScopeFigures,
        SnapshotKey, ThroughputFigures,
    };

    fn snapshot() -> ConsolidationSnapshot {
        ConsolidationSnapshot {
            key: SnapshotKey::new(
                EntityRef::project("alpha"),
                NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date"),
            ),
            scope: ScopeFigures {
                remaining_scope: 4,
                current_wip: 1,
                ..ScopeFigures::default()
            },
            lead_time: LeadTimeFigures::default(),
            throughput: ThroughputFigures {
                weekly: vec![0, 1, 1],
                project_throughput: 2,
            },
            forecast: ForecastFigures {
                forecast_known: true,
                monte_carlo_weeks_p80: 4.0,
                odds_to_deadline: 0.5,
                operational_risk: 0.5,
                ..ForecastFigures::default()
            },
            pressure: PressureFigures::default(),
            rollup: RollupMarkers {
                last_data_in_month: true,
                ..RollupMarkers::default()
            },
        }
    }

    #[test]
    fn text_row_is_tab_separated() {
        let mut buf = Vec::new();
        snapshot_text_row(&snapshot(), &mut buf).expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], "project:alpha");
        assert_eq!(fields[1], "2024-01-31");
        assert_eq!(fields[2], "4");
        assert_eq!(fields[4], "4.0");
    }

    #[test]
    fn pretty_output_names_markers_and_unknowns() {
        let mut snap = snapshot();
        snap.forecast.forecast_known = false;
        let mut buf = Vec::new();
        snapshot_pretty(&snap, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("project:alpha @ 2024-01-31"));
        assert!(text.contains("unknown (no throughput history)"));
        assert!(text.contains("no deliveries"));
        assert!(text.contains("month"));
        assert!(text.contains("[0 1 1]"));
    }

    #[test]
    fn bad_kind_is_reported_with_code() {
        let err = parse_entity("portfolio", "x", OutputMode::Text).expect_err("should fail");
        assert!(err.to_string().contains("portfolio"));
        let ok = parse_entity("Team", "platform", OutputMode::Text).expect("valid kind");
        assert_eq!(ok, EntityRef::new(EntityKind::Team, "platform"));
    }

    #[test]
    fn missing_project_is_not_initialized() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = load_project(dir.path(), OutputMode::Text).expect_err("should fail");
        assert!(err.to_string().contains(".flowcast"));
    }
}
