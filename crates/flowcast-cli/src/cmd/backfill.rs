use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use flowcast_core::calendar::DateRange;
use flowcast_core::db::{SqliteCorpus, SqliteSnapshotStore};
use flowcast_core::error::ErrorCode;
use flowcast_core::model::EntityRef;
use flowcast_core::store::UpsertOutcome;
use flowcast_engine::{ConsolidationReport, SnapshotBuilder};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use super::{
    consolidation_error, fail, forecaster, load_project, open_connection, parse_entity, settings,
    snapshot_text_row,
};
use crate::output::{CliError, OutputMode, percent, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Entity kind: project, team, customer or contract.
    pub kind: String,

    /// Entity id.
    pub id: String,

    /// First date to consolidate, YYYY-MM-DD.
    #[arg(long)]
    pub from: NaiveDate,

    /// Last date to consolidate (inclusive), YYYY-MM-DD.
    #[arg(long)]
    pub to: NaiveDate,
}

#[derive(Debug, Serialize)]
struct BackfillReport {
    entity: EntityRef,
    from: NaiveDate,
    to: NaiveDate,
    created: usize,
    updated: usize,
    snapshots: Vec<ConsolidationReport>,
}

impl BackfillReport {
    fn new(entity: EntityRef, range: DateRange, snapshots: Vec<ConsolidationReport>) -> Self {
        let created = snapshots
            .iter()
            .filter(|r| r.outcome == UpsertOutcome::Created)
            .count();
        Self {
            entity,
            from: range.start(),
            to: range.end(),
            created,
            updated: snapshots.len() - created,
            snapshots,
        }
    }
}

/// Execute `fc backfill <kind> <id> --from D --to D`.
///
/// # Errors
///
/// Returns an error (E2003) for a reversed range, or the first
/// consolidation failure; days before it stay written.
pub fn run_backfill(args: &BackfillArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project(project_root, output)?;
    let entity = parse_entity(&args.kind, &args.id, output)?;
    let range = match DateRange::new(args.from, args.to) {
        Ok(range) => range,
        Err(err) => {
            return fail(
                output,
                &CliError::from_code(ErrorCode::InvalidDateRange, err.to_string()),
            );
        }
    };

    let conn = open_connection(&config, output)?;
    let corpus = SqliteCorpus::new(&conn);
    let store = SqliteSnapshotStore::new(&conn);
    let forecaster = forecaster(&config);
    let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, settings(&config));

    let snapshots = match builder.run_consolidation_backfill(&entity, range) {
        Ok(snapshots) => snapshots,
        Err(err) => return fail(output, &consolidation_error(&err)),
    };
    let report = BackfillReport::new(entity, range, snapshots);

    render_mode(
        output,
        &report,
        |r, w| {
            for item in &r.snapshots {
                snapshot_text_row(&item.snapshot, w)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &format!("Backfill {} {}..{}", r.entity, r.from, r.to))?;
            pretty_kv(w, "days", r.snapshots.len().to_string())?;
            pretty_kv(w, "created", r.created.to_string())?;
            pretty_kv(w, "updated", r.updated.to_string())?;
            writeln!(w)?;
            for item in &r.snapshots {
                let snap = &item.snapshot;
                let p80 = if snap.forecast.forecast_known {
                    format!("{:>5.1}w", snap.forecast.monte_carlo_weeks_p80)
                } else {
                    "    -".to_string()
                };
                writeln!(
                    w,
                    "  {}  remaining {:>4}  p80 {p80}  risk {:>6}",
                    snap.key.consolidation_date,
                    snap.scope.remaining_scope,
                    percent(snap.forecast.operational_risk),
                )?;
            }
            Ok(())
        },
    )
}
