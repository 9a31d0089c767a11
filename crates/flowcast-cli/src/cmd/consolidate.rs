use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use flowcast_core::db::{SqliteCorpus, SqliteSnapshotStore};
use flowcast_core::store::UpsertOutcome;
use flowcast_engine::SnapshotBuilder;
use std::io::Write;
use std::path::Path;

use super::{
    consolidation_error, fail, forecaster, load_project, open_connection, parse_entity, settings,
    snapshot_pretty, snapshot_text_row, today,
};
use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    /// Entity kind: project, team, customer or contract.
    pub kind: String,

    /// Entity id.
    pub id: String,

    /// Consolidation date, YYYY-MM-DD (defaults to today, UTC).
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Execute `fc consolidate <kind> <id>`.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the entity is
/// unknown, or the corpus/store cannot be read or written.
pub fn run_consolidate(args: &ConsolidateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project(project_root, output)?;
    let entity = parse_entity(&args.kind, &args.id, output)?;
    let date = args.date.unwrap_or_else(today);

    let conn = open_connection(&config, output)?;
    let corpus = SqliteCorpus::new(&conn);
    let store = SqliteSnapshotStore::new(&conn);
    let forecaster = forecaster(&config);
    let builder = SnapshotBuilder::new(&corpus, &store, &forecaster, settings(&config));

    let report = match builder.run_consolidation(&entity, date) {
        Ok(report) => report,
        Err(err) => return fail(output, &consolidation_error(&err)),
    };

    render_mode(
        output,
        &report,
        |r, w| snapshot_text_row(&r.snapshot, w),
        |r, w| {
            snapshot_pretty(&r.snapshot, w)?;
            let verb = match r.outcome {
                UpsertOutcome::Created => "created",
                UpsertOutcome::Updated => "updated",
            };
            writeln!(w)?;
            writeln!(w, "✓ Snapshot {verb}.")
        },
    )
}
