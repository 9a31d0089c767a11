use anyhow::{Context as _, Result};
use clap::Args;
use flowcast_core::config::{PROJECT_DIR, ProjectConfig, resolve_config};
use flowcast_core::db::{self, migrations};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::fail;
use crate::output::{CliError, OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.flowcast/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "flowcast.db\nflowcast.db-wal\nflowcast.db-shm\n";

#[derive(Debug, Serialize)]
struct InitReport {
    project_dir: PathBuf,
    config: PathBuf,
    database: PathBuf,
    schema_version: u32,
}

/// Execute `fc init`. Creates the project skeleton:
///
/// ```text
/// .flowcast/
///   config.toml   (default project config)
///   flowcast.db   (migrated, empty store)
///   .gitignore    (database files)
/// ```
///
/// # Errors
///
/// Returns an error if `.flowcast/config.toml` already exists and `--force`
/// is not set, or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project_dir = project_root.join(PROJECT_DIR);
    let config_path = project_dir.join("config.toml");

    if config_path.exists() && !args.force {
        return fail(
            output,
            &CliError {
                suggestion: Some("Use `fc init --force` to rewrite the default config.".into()),
                ..CliError::new(format!("{PROJECT_DIR}/ already exists"))
            },
        );
    }

    std::fs::create_dir_all(&project_dir)
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    let config = toml::to_string_pretty(&ProjectConfig::default())
        .context("Failed to serialize default config")?;
    std::fs::write(&config_path, config)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = project_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let effective = resolve_config(project_root)?;
    let conn = db::open_store(&effective.database_path)?;
    let schema_version = migrations::current_schema_version(&conn)?;
    tracing::info!(database = %effective.database_path.display(), schema_version, "project initialized");

    let report = InitReport {
        project_dir,
        config: config_path,
        database: effective.database_path,
        schema_version,
    };

    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "{}\t{}", r.project_dir.display(), r.database.display()),
        |r, w| {
            writeln!(w, "✓ Initialized {PROJECT_DIR}/ project structure.")?;
            writeln!(w)?;
            pretty_kv(w, "config", r.config.display().to_string())?;
            pretty_kv(w, "database", r.database.display().to_string())?;
            pretty_kv(w, "schema version", r.schema_version.to_string())?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  Load your demands:")?;
            writeln!(w, "    fc import --file corpus.json")?;
            writeln!(w)?;
            writeln!(w, "  Consolidate today's snapshots:")?;
            writeln!(w, "    fc batch")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_init_creates_structure() {
        let dir = tempfile::tempdir().expect("create temp dir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");

        let project_dir = dir.path().join(PROJECT_DIR);
        assert!(project_dir.join("config.toml").is_file());
        assert!(project_dir.join(".gitignore").is_file());

        let written = std::fs::read_to_string(project_dir.join("config.toml")).expect("read");
        let parsed: ProjectConfig = toml::from_str(&written).expect("config round-trips");
        assert_eq!(parsed, ProjectConfig::default());
    }

    #[test]
    fn second_init_requires_force() {
        let dir = tempfile::tempdir().expect("create temp dir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");

        let err = run_init(&InitArgs { force: false }, OutputMode::Json, dir.path())
            .expect_err("should fail");
        assert!(err.to_string().contains("already exists"));

        run_init(&InitArgs { force: true }, OutputMode::Json, dir.path()).expect("forced init");
    }
}
