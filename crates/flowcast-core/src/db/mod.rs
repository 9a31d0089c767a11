//! SQLite persistence for the demand corpus and consolidation snapshots.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` so batch workers can read while another worker writes
//! - `busy_timeout = 5s` to ride out short write contention between workers
//! - `foreign_keys = ON` to keep memberships pointing at real entities

pub mod corpus;
pub mod import;
pub mod migrations;
pub mod schema;
pub mod snapshots;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::{path::Path, time::Duration};

pub use corpus::SqliteCorpus;
pub use snapshots::SqliteSnapshotStore;

/// Busy timeout used for every store connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Open (or create) the flowcast database, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open flowcast database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply flowcast migrations")?;

    Ok(conn)
}

/// In-memory database with the full schema, for tests and dry runs.
///
/// # Errors
///
/// Returns an error if migrating the schema fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply flowcast migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}
