//! Load a demand corpus from a generic JSON document.
//!
//! Tracker-specific exports are mapped to this shape outside flowcast; this
//! module only validates and upserts it.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use super::format_date;
use crate::model::{DemandView, EntityKind, EntityProfile, EntityRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub profile: EntityProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    #[serde(flatten)]
    pub demand: DemandView,
    /// Every entity this demand counts for.
    #[serde(default)]
    pub memberships: Vec<EntityRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub demands: Vec<DemandRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub entities: usize,
    pub demands: usize,
    pub memberships: usize,
}

/// Upsert every entity, demand and membership of `doc` in one transaction.
///
/// Re-importing the same document is a no-op apart from refreshed values.
///
/// # Errors
///
/// Returns an error (and rolls back) on a membership that points at an
/// entity missing from both the document and the database, or on any SQL
/// failure.
pub fn import_corpus(conn: &mut Connection, doc: &CorpusDocument) -> Result<ImportStats> {
    let tx = conn.transaction().context("begin import transaction")?;
    let mut stats = ImportStats::default();

    for record in &doc.entities {
        if record.id.trim().is_empty() {
            bail!("entity of kind {} has an empty id", record.kind);
        }
        tx.execute(
            "INSERT INTO entities (
                entity_kind, entity_id, name, start_date, end_date,
                initial_scope, wip_limit, peer_group
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(entity_kind, entity_id) DO UPDATE SET
                name = excluded.name,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                initial_scope = excluded.initial_scope,
                wip_limit = excluded.wip_limit,
                peer_group = excluded.peer_group",
            params![
                record.kind.as_str(),
                record.id,
                record.name,
                format_date(record.profile.start_date),
                record.profile.end_date.map(format_date),
                record.profile.initial_scope,
                record.profile.wip_limit,
                record.profile.peer_group,
            ],
        )
        .with_context(|| format!("import entity {}:{}", record.kind, record.id))?;
        stats.entities += 1;
    }

    for record in &doc.demands {
        let demand = &record.demand;
        tx.execute(
            "INSERT INTO demands (
                demand_id, created_at_us, commitment_at_us, finished_at_us,
                discarded_at_us, effort_upstream, effort_downstream
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(demand_id) DO UPDATE SET
                created_at_us = excluded.created_at_us,
                commitment_at_us = excluded.commitment_at_us,
                finished_at_us = excluded.finished_at_us,
                discarded_at_us = excluded.discarded_at_us,
                effort_upstream = excluded.effort_upstream,
                effort_downstream = excluded.effort_downstream",
            params![
                demand.id,
                demand.created_at.timestamp_micros(),
                demand.commitment_at.map(|at| at.timestamp_micros()),
                demand.finished_at.map(|at| at.timestamp_micros()),
                demand.discarded_at.map(|at| at.timestamp_micros()),
                demand.effort_upstream,
                demand.effort_downstream,
            ],
        )
        .with_context(|| format!("import demand {}", demand.id))?;
        stats.demands += 1;

        for entity in &record.memberships {
            tx.execute(
                "INSERT OR IGNORE INTO demand_memberships (entity_kind, entity_id, demand_id) \
                 VALUES (?1, ?2, ?3)",
                params![entity.kind.as_str(), entity.id, demand.id],
            )
            .with_context(|| format!("attach demand {} to {entity}", demand.id))?;
            stats.memberships += 1;
        }
    }

    tx.commit().context("commit import transaction")?;
    tracing::info!(
        entities = stats.entities,
        demands = stats.demands,
        memberships = stats.memberships,
        "imported demand corpus"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    #[test]
    fn reimport_is_idempotent() {
        let mut conn = open_in_memory().expect("open db");
        let doc: CorpusDocument = serde_json::from_str(
            r#"{
                "entities": [{"kind": "team", "id": "t-1", "start_date": "2024-01-01"}],
                "demands": [{"id": "d-1", "created_at": "2024-01-02T00:00:00Z",
                             "memberships": [{"kind": "team", "id": "t-1"}]}]
            }"#,
        )
        .expect("valid document");

        let first = import_corpus(&mut conn, &doc).expect("first import");
        let second = import_corpus(&mut conn, &doc).expect("second import");
        assert_eq!(first, second);
        assert_eq!(count(&conn, "entities"), 1);
        assert_eq!(count(&conn, "demands"), 1);
        assert_eq!(count(&conn, "demand_memberships"), 1);
    }

    #[test]
    fn membership_to_unknown_entity_rolls_back() {
        let mut conn = open_in_memory().expect("open db");
        let doc: CorpusDocument = serde_json::from_str(
            r#"{
                "demands": [{"id": "d-1", "created_at": "2024-01-02T00:00:00Z",
                             "memberships": [{"kind": "project", "id": "ghost"}]}]
            }"#,
        )
        .expect("valid document");

        let err = import_corpus(&mut conn, &doc).expect_err("should fail");
        assert!(format!("{err:#}").contains("attach demand d-1"));
        assert_eq!(count(&conn, "demands"), 0);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut conn = open_in_memory().expect("open db");
        let doc: CorpusDocument = serde_json::from_str(
            r#"{"entities": [{"kind": "project", "id": "p-1",
                              "start_date": "2024-02-01", "end_date": "2024-01-01"}]}"#,
        )
        .expect("valid document");
        assert!(import_corpus(&mut conn, &doc).is_err());
    }
}
