use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use clap::{Args, ValueEnum};
use flowcast_core::db::SqliteSnapshotStore;
use flowcast_core::error::{ErrorCode, StoreError};
use flowcast_core::model::{EntityRef, SnapshotKey, StoredSnapshot};
use flowcast_core::store::{RollupPeriod, SnapshotStore};
use std::io::Write;
use std::path::Path;

use super::{
    fail, load_project, open_connection, parse_entity, snapshot_pretty, snapshot_text_row,
};
use crate::output::{CliError, OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Entity kind: project, team, customer or contract.
    pub kind: String,

    /// Entity id.
    pub id: String,

    /// Show the snapshot of this date instead of the latest one.
    #[arg(long, conflicts_with = "rollup")]
    pub date: Option<NaiveDate>,

    /// List the rows that close each week, month or year.
    #[arg(long, value_enum)]
    pub rollup: Option<Rollup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Rollup {
    Week,
    Month,
    Year,
}

impl Rollup {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl From<Rollup> for RollupPeriod {
    fn from(value: Rollup) -> Self {
        match value {
            Rollup::Week => Self::Week,
            Rollup::Month => Self::Month,
            Rollup::Year => Self::Year,
        }
    }
}

/// Execute `fc show <kind> <id>`.
///
/// # Errors
///
/// Returns an error (E2001) when no matching snapshot is stored, or E3002
/// when a stored row cannot be decoded.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project(project_root, output)?;
    let entity = parse_entity(&args.kind, &args.id, output)?;
    let conn = open_connection(&config, output)?;
    let store = SqliteSnapshotStore::new(&conn);

    if let Some(rollup) = args.rollup {
        let rows = match store.marked(&entity, rollup.into()) {
            Ok(rows) => rows,
            Err(err) => return fail(output, &store_error(&err)),
        };
        return render_mode(
            output,
            &rows,
            |rows, w| {
                for row in rows {
                    snapshot_text_row(&row.snapshot, w)?;
                }
                Ok(())
            },
            |rows, w| {
                if rows.is_empty() {
                    return writeln!(w, "No {} rollup rows for {entity}.", rollup.as_str());
                }
                for row in rows {
                    snapshot_pretty(&row.snapshot, w)?;
                    writeln!(w)?;
                }
                Ok(())
            },
        );
    }

    let found = match args.date {
        Some(date) => store.get(&SnapshotKey::new(entity.clone(), date)),
        None => store.list(&entity, None).map(|mut rows| rows.pop()),
    };
    let row = match found {
        Ok(Some(row)) => row,
        Ok(None) => return fail(output, &not_found(&entity, args.date)),
        Err(err) => return fail(output, &store_error(&err)),
    };

    render_mode(
        output,
        &row,
        |row, w| snapshot_text_row(&row.snapshot, w),
        |row, w| {
            snapshot_pretty(&row.snapshot, w)?;
            pretty_kv(w, "recorded", timestamp(row))
        },
    )
}

fn not_found(entity: &EntityRef, date: Option<NaiveDate>) -> CliError {
    let message = date.map_or_else(
        || format!("no snapshots stored for {entity}"),
        |date| format!("no snapshot stored for {entity} on {date}"),
    );
    let rerun = date.map_or_else(String::new, |date| format!(" --date {date}"));
    CliError::with_details(
        message,
        format!("Run `fc consolidate {} {}{rerun}` first.", entity.kind, entity.id),
        ErrorCode::EntityNotFound.code(),
    )
}

fn store_error(err: &StoreError) -> CliError {
    CliError::from_code(err.code(), err.to_string())
}

fn timestamp(row: &StoredSnapshot) -> String {
    let render = |us: i64| {
        DateTime::from_timestamp_micros(us)
            .map_or_else(|| us.to_string(), |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    };
    if row.created_at_us == row.updated_at_us {
        render(row.created_at_us)
    } else {
        format!(
            "{} (first {})",
            render(row.updated_at_us),
            render(row.created_at_us)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollup_maps_to_period() {
        assert_eq!(RollupPeriod::from(Rollup::Week), RollupPeriod::Week);
        assert_eq!(RollupPeriod::from(Rollup::Month), RollupPeriod::Month);
        assert_eq!(RollupPeriod::from(Rollup::Year), RollupPeriod::Year);
    }

    #[test]
    fn not_found_suggests_consolidation() {
        let entity = EntityRef::project("alpha");
        let date = NaiveDate::from_ymd_opt(2024, 1, 31);
        let err = not_found(&entity, date);
        assert_eq!(err.error_code.as_deref(), Some("E2001"));
        assert_eq!(
            err.suggestion.as_deref(),
            Some("Run `fc consolidate project alpha --date 2024-01-31` first.")
        );

        let latest = not_found(&entity, None);
        assert!(latest.message.contains("no snapshots"));
    }
}
