//! [`DemandCorpusReader`] over the `entities` / `demands` /
//! `demand_memberships` tables.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_date, parse_date};
use crate::calendar::day_cutoff;
use crate::corpus::DemandCorpusReader;
use crate::error::CorpusError;
use crate::model::{DemandView, EntityKind, EntityProfile, EntityRef};

/// Read-only corpus backed by a borrowed connection.
pub struct SqliteCorpus<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCorpus<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn ensure_entity(&self, entity: &EntityRef) -> Result<(), CorpusError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM entities WHERE entity_kind = ?1 AND entity_id = ?2)",
            params![entity.kind.as_str(), entity.id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(CorpusError::UnknownEntity(entity.clone()))
        }
    }
}

struct ProfileRow {
    start_date: String,
    end_date: Option<String>,
    initial_scope: u32,
    wip_limit: u32,
    peer_group: Option<String>,
}

impl ProfileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            initial_scope: row.get("initial_scope")?,
            wip_limit: row.get("wip_limit")?,
            peer_group: row.get("peer_group")?,
        })
    }

    fn into_profile(self, entity: &EntityRef) -> Result<EntityProfile, CorpusError> {
        let start_date = parse_date(&self.start_date).ok_or_else(|| {
            CorpusError::Malformed(format!("{entity}: bad start_date '{}'", self.start_date))
        })?;
        let end_date = match self.end_date.as_deref() {
            Some(text) => Some(parse_date(text).ok_or_else(|| {
                CorpusError::Malformed(format!("{entity}: bad end_date '{text}'"))
            })?),
            None => None,
        };

        Ok(EntityProfile {
            start_date,
            end_date,
            initial_scope: self.initial_scope,
            wip_limit: self.wip_limit,
            peer_group: self.peer_group,
        })
    }
}

struct DemandRow {
    id: String,
    created_at_us: i64,
    commitment_at_us: Option<i64>,
    finished_at_us: Option<i64>,
    discarded_at_us: Option<i64>,
    effort_upstream: f64,
    effort_downstream: f64,
}

impl DemandRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("demand_id")?,
            created_at_us: row.get("created_at_us")?,
            commitment_at_us: row.get("commitment_at_us")?,
            finished_at_us: row.get("finished_at_us")?,
            discarded_at_us: row.get("discarded_at_us")?,
            effort_upstream: row.get("effort_upstream")?,
            effort_downstream: row.get("effort_downstream")?,
        })
    }

    fn into_view(self) -> Result<DemandView, CorpusError> {
        let id = self.id;
        let stamp = |us: i64, field: &str| {
            DateTime::<Utc>::from_timestamp_micros(us)
                .ok_or_else(|| CorpusError::Malformed(format!("demand {id}: bad {field} {us}")))
        };
        let optional = |us: Option<i64>, field: &str| us.map(|us| stamp(us, field)).transpose();

        Ok(DemandView {
            created_at: stamp(self.created_at_us, "created_at_us")?,
            commitment_at: optional(self.commitment_at_us, "commitment_at_us")?,
            finished_at: optional(self.finished_at_us, "finished_at_us")?,
            discarded_at: optional(self.discarded_at_us, "discarded_at_us")?,
            effort_upstream: self.effort_upstream,
            effort_downstream: self.effort_downstream,
            id,
        })
    }
}

impl DemandCorpusReader for SqliteCorpus<'_> {
    fn entity_profile(&self, entity: &EntityRef) -> Result<EntityProfile, CorpusError> {
        let row = self
            .conn
            .query_row(
                "SELECT start_date, end_date, initial_scope, wip_limit, peer_group \
                 FROM entities WHERE entity_kind = ?1 AND entity_id = ?2",
                params![entity.kind.as_str(), entity.id],
                ProfileRow::from_row,
            )
            .optional()?;

        row.ok_or_else(|| CorpusError::UnknownEntity(entity.clone()))?
            .into_profile(entity)
    }

    fn demands_for(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<Vec<DemandView>, CorpusError> {
        self.ensure_entity(entity)?;
        let cutoff_us = day_cutoff(as_of).timestamp_micros();

        let mut stmt = self.conn.prepare_cached(
            "SELECT d.demand_id, d.created_at_us, d.commitment_at_us, d.finished_at_us, \
                    d.discarded_at_us, d.effort_upstream, d.effort_downstream \
             FROM demands d \
             JOIN demand_memberships m ON m.demand_id = d.demand_id \
             WHERE m.entity_kind = ?1 AND m.entity_id = ?2 AND d.created_at_us < ?3 \
             ORDER BY d.created_at_us, d.demand_id",
        )?;
        let rows = stmt.query_map(
            params![entity.kind.as_str(), entity.id, cutoff_us],
            DemandRow::from_row,
        )?;

        let mut demands = Vec::new();
        for row in rows {
            demands.push(row?.into_view()?);
        }

        tracing::trace!(entity = %entity, %as_of, count = demands.len(), "loaded demands");
        Ok(demands)
    }

    fn peers(&self, entity: &EntityRef, as_of: NaiveDate) -> Result<Vec<EntityRef>, CorpusError> {
        let profile = self.entity_profile(entity)?;
        let Some(group) = profile.peer_group else {
            return Ok(vec![entity.clone()]);
        };

        let date = format_date(as_of);
        let mut stmt = self.conn.prepare_cached(
            "SELECT entity_id FROM entities \
             WHERE entity_kind = ?1 AND peer_group = ?2 \
               AND (entity_id = ?3 OR (start_date <= ?4 AND (end_date IS NULL OR end_date >= ?4))) \
             ORDER BY entity_id",
        )?;
        let ids = stmt.query_map(
            params![entity.kind.as_str(), group, entity.id, date],
            |row| row.get::<_, String>(0),
        )?;

        let mut peers = Vec::new();
        for id in ids {
            peers.push(EntityRef::new(entity.kind, id?));
        }
        Ok(peers)
    }

    fn entities_active_on(&self, date: NaiveDate) -> Result<Vec<EntityRef>, CorpusError> {
        let date = format_date(date);
        let mut stmt = self.conn.prepare_cached(
            "SELECT entity_kind, entity_id FROM entities \
             WHERE start_date <= ?1 AND (end_date IS NULL OR end_date >= ?1) \
             ORDER BY entity_kind, entity_id",
        )?;
        let rows = stmt.query_map(params![date], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (kind, id) = row?;
            let kind = kind
                .parse::<EntityKind>()
                .map_err(|err| CorpusError::Malformed(err.to_string()))?;
            entities.push(EntityRef::new(kind, id));
        }
        Ok(entities)
    }
}
