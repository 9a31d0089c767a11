use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use flowcast_core::corpus::DemandCorpusReader;
use flowcast_core::db::SqliteCorpus;
use flowcast_engine::{BatchReport, BatchRunner, SqliteWorker};
use std::io::Write;
use std::path::Path;

use super::{fail, forecaster, load_project, open_connection, settings, snapshot_text_row, today};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Consolidation date, YYYY-MM-DD (defaults to today, UTC).
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Worker threads (defaults to `runner.workers` in the project config).
    #[arg(long)]
    pub workers: Option<u32>,
}

/// Execute `fc batch`: consolidate every entity active on the date.
///
/// # Errors
///
/// Returns an error if the active entities cannot be listed, or after
/// rendering the report when any entity failed.
pub fn run_batch(args: &BatchArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project(project_root, output)?;
    let date = args.date.unwrap_or_else(today);

    let entities = {
        let conn = open_connection(&config, output)?;
        match SqliteCorpus::new(&conn).entities_active_on(date) {
            Ok(entities) => entities,
            Err(err) => return fail(output, &CliError::from_code(err.code(), err.to_string())),
        }
    };

    let runner = BatchRunner::new(args.workers.unwrap_or(config.project.runner.workers));
    let forecaster = forecaster(&config);
    let settings = settings(&config);
    let database = config.database_path.as_path();
    let report = runner.run(date, entities, |_| {
        SqliteWorker::open(database, forecaster, settings)
    });

    render_mode(output, &report, render_text, render_pretty)?;

    if let Some(first) = report.failed.first() {
        return fail(
            output,
            &CliError::with_details(
                format!(
                    "{} of {} entities failed on {date}",
                    report.failed.len(),
                    report.failed.len() + report.succeeded.len()
                ),
                format!(
                    "Rerun `fc consolidate {} {} --date {date}` after fixing the cause.",
                    first.entity.kind, first.entity.id
                ),
                first.code.clone(),
            ),
        );
    }
    Ok(())
}

fn render_text(report: &BatchReport, w: &mut dyn Write) -> std::io::Result<()> {
    for item in &report.succeeded {
        snapshot_text_row(&item.snapshot, w)?;
    }
    for failure in &report.failed {
        writeln!(w, "{}\t{}\tFAILED\t{}", failure.entity, report.as_of, failure.code)?;
    }
    Ok(())
}

fn render_pretty(report: &BatchReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Batch {}", report.as_of))?;
    pretty_kv(w, "succeeded", report.succeeded.len().to_string())?;
    pretty_kv(w, "failed", report.failed.len().to_string())?;

    if !report.succeeded.is_empty() {
        writeln!(w)?;
        for item in &report.succeeded {
            let snap = &item.snapshot;
            writeln!(
                w,
                "  ✓ {:<32} remaining {:>4}  wip {:>3}",
                snap.key.entity.to_string(),
                snap.scope.remaining_scope,
                snap.scope.current_wip
            )?;
        }
    }
    if !report.failed.is_empty() {
        writeln!(w)?;
        for failure in &report.failed {
            writeln!(
                w,
                "  ✗ {:<32} [{}] {}",
                failure.entity.to_string(),
                failure.code,
                failure.message
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcast_core::model::EntityRef;
    use flowcast_engine::BatchFailure;

    fn report() -> BatchReport {
        BatchReport {
            as_of: NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date"),
            succeeded: Vec::new(),
            failed: vec![BatchFailure {
                entity: EntityRef::project("ghost"),
                code: "E2001".into(),
                message: "unknown entity project:ghost".into(),
            }],
        }
    }

    #[test]
    fn text_marks_failures() {
        let mut buf = Vec::new();
        render_text(&report(), &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "project:ghost\t2024-01-31\tFAILED\tE2001\n");
    }

    #[test]
    fn pretty_lists_failure_codes() {
        let mut buf = Vec::new();
        render_pretty(&report(), &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Batch 2024-01-31"));
        assert!(text.contains("[E2001]"));
    }
}
