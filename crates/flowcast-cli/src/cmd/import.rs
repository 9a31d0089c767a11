use anyhow::{Context as _, Result};
use clap::Args;
use flowcast_core::db::import::{CorpusDocument, ImportStats, import_corpus};
use flowcast_core::error::ErrorCode;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{fail, load_project, open_connection};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Corpus JSON document with `entities` and `demands` arrays.
    #[arg(long, short = 'f')]
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    file: PathBuf,
    #[serde(flatten)]
    stats: ImportStats,
}

/// Execute `fc import --file <path>`.
///
/// # Errors
///
/// Returns an error (E5002) if the file cannot be read, is not a valid
/// corpus document, or references unknown entities.
pub fn run_import(args: &ImportArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project(project_root, output)?;
    let file = if args.file.is_absolute() {
        args.file.clone()
    } else {
        project_root.join(&args.file)
    };

    let doc = match read_document(&file) {
        Ok(doc) => doc,
        Err(err) => {
            return fail(
                output,
                &CliError::from_code(ErrorCode::ImportFailed, format!("{err:#}")),
            );
        }
    };

    let mut conn = open_connection(&config, output)?;
    let stats = match import_corpus(&mut conn, &doc) {
        Ok(stats) => stats,
        Err(err) => {
            return fail(
                output,
                &CliError::from_code(ErrorCode::ImportFailed, format!("{err:#}")),
            );
        }
    };
    tracing::info!(
        entities = stats.entities,
        demands = stats.demands,
        memberships = stats.memberships,
        "corpus imported"
    );

    let report = ImportReport { file, stats };
    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}",
                r.stats.entities, r.stats.demands, r.stats.memberships
            )
        },
        |r, w| {
            pretty_section(w, &format!("Imported {}", r.file.display()))?;
            pretty_kv(w, "entities", r.stats.entities.to_string())?;
            pretty_kv(w, "demands", r.stats.demands.to_string())?;
            pretty_kv(w, "memberships", r.stats.memberships.to_string())
        },
    )
}

fn read_document(path: &Path) -> Result<CorpusDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
