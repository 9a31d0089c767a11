//! Snapshot persistence seam.
//!
//! Writers go through [`SnapshotStore::upsert`], which must be atomic per key:
//! a second write for the same `(entity_id, entity_kind, consolidation_date)`
//! replaces the row instead of adding one. The SQLite implementation lives in
//! [`crate::db::snapshots`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::calendar::DateRange;
use crate::error::StoreError;
use crate::model::{ConsolidationSnapshot, EntityRef, RollupMarkers, SnapshotKey, StoredSnapshot};

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Aggregation period selected through the rollup markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupPeriod {
    Week,
    Month,
    Year,
}

impl RollupPeriod {
    #[must_use]
    pub const fn is_marked(self, markers: &RollupMarkers) -> bool {
        match self {
            Self::Week => markers.last_data_in_week,
            Self::Month => markers.last_data_in_month,
            Self::Year => markers.last_data_in_year,
        }
    }
}

pub trait SnapshotStore {
    /// Insert or replace the row for `snapshot.key`.
    ///
    /// # Errors
    ///
    /// Backend write failures.
    fn upsert(&self, snapshot: &ConsolidationSnapshot) -> Result<UpsertOutcome, StoreError>;

    /// # Errors
    ///
    /// Backend read failures or an undecodable row.
    fn get(&self, key: &SnapshotKey) -> Result<Option<StoredSnapshot>, StoreError>;

    /// Rows for `entity` in chronological order, optionally limited to `range`.
    ///
    /// # Errors
    ///
    /// Backend read failures or an undecodable row.
    fn list(
        &self,
        entity: &EntityRef,
        range: Option<DateRange>,
    ) -> Result<Vec<StoredSnapshot>, StoreError>;

    /// # Errors
    ///
    /// Backend read failures.
    fn count(&self, entity: &EntityRef) -> Result<usize, StoreError>;

    /// Rows flagged as the last data point of `period`, chronologically.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::list`] failures.
    fn marked(
        &self,
        entity: &EntityRef,
        period: RollupPeriod,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        Ok(self
            .list(entity, None)?
            .into_iter()
            .filter(|row| period.is_marked(&row.snapshot.rollup))
            .collect())
    }
}

/// Mutex-guarded in-memory store; safe to share between worker threads.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    rows: Mutex<BTreeMap<SnapshotKey, StoredSnapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<SnapshotKey, StoredSnapshot>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn upsert(&self, snapshot: &ConsolidationSnapshot) -> Result<UpsertOutcome, StoreError> {
        let now_us = Utc::now().timestamp_micros();
        let mut rows = self.rows();

        if let Some(existing) = rows.get_mut(&snapshot.key) {
            existing.snapshot = snapshot.clone();
            existing.updated_at_us = now_us.max(existing.created_at_us);
            return Ok(UpsertOutcome::Updated);
        }

        rows.insert(
            snapshot.key.clone(),
            StoredSnapshot {
                snapshot: snapshot.clone(),
                created_at_us: now_us,
                updated_at_us: now_us,
            },
        );
        Ok(UpsertOutcome::Created)
    }

    fn get(&self, key: &SnapshotKey) -> Result<Option<StoredSnapshot>, StoreError> {
        Ok(self.rows().get(key).cloned())
    }

    fn list(
        &self,
        entity: &EntityRef,
        range: Option<DateRange>,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        Ok(self
            .rows()
            .iter()
            .filter(|(key, _)| &key.entity == entity)
            .filter(|(key, _)| range.is_none_or(|r| r.contains(key.consolidation_date)))
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn count(&self, entity: &EntityRef) -> Result<usize, StoreError> {
        Ok(self.rows().keys().filter(|key| &key.entity == entity).count())
    }
}
