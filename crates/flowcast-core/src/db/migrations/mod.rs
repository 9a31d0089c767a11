//! SQLite schema migrations for the flowcast database.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL), (2, schema::MIGRATION_V2_SQL)];

/// Read `PRAGMA user_version` and convert it to a Rust `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the version value cannot be
/// represented as `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order, one transaction each.
///
/// A migration runs only when its version is above `user_version`, and its
/// DDL uses `IF NOT EXISTS`, so running this repeatedly is harmless.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.execute(
            "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(*version)],
        )?;
        tx.commit()?;
        tracing::debug!(version, "applied flowcast schema migration");
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate};
    use crate::db::schema;
    use rusqlite::Connection;
    use std::collections::BTreeSet;

    /// Names of every table or index in the database.
    fn catalog(conn: &Connection, kind: &str) -> rusqlite::Result<BTreeSet<String>> {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1")?;
        let names = stmt.query_map([kind], |row| row.get::<_, String>(0))?;
        names.collect()
    }

    #[test]
    fn fresh_database_reaches_latest_version() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        let tables = catalog(&conn, "table")?;
        for table in [
            "entities",
            "demands",
            "demand_memberships",
            "store_meta",
            "consolidation_snapshots",
        ] {
            assert!(tables.contains(table), "missing table {table}");
        }

        let indexes = catalog(&conn, "index")?;
        let missing: Vec<_> = schema::REQUIRED_INDEXES
            .iter()
            .filter(|index| !indexes.contains(**index))
            .collect();
        assert!(missing.is_empty(), "missing indexes {missing:?}");
        Ok(())
    }

    #[test]
    fn rerunning_keeps_a_single_meta_row() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        migrate(&mut conn)?;

        let (rows, recorded): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), MAX(schema_version) FROM store_meta",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(rows, 1);
        assert_eq!(recorded, i64::from(LATEST_SCHEMA_VERSION));
        Ok(())
    }

    #[test]
    fn corpus_only_database_gains_snapshot_table() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1_i64)?;
        assert!(!catalog(&conn, "table")?.contains("consolidation_snapshots"));

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert!(catalog(&conn, "table")?.contains("consolidation_snapshots"));
        Ok(())
    }
}
