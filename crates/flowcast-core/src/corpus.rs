//! Read-only demand corpus seam.
//!
//! The engine never reaches for a database handle directly: everything it
//! knows about an entity comes through [`DemandCorpusReader`]. The SQLite
//! implementation lives in [`crate::db::corpus`]; [`MemoryCorpus`] backs tests
//! and embedders that already hold the demands in memory.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::calendar::{day_cutoff, weeks_until};
use crate::error::CorpusError;
use crate::model::{DemandView, EntityProfile, EntityRef};

/// Read model consumed by the snapshot builder.
pub trait DemandCorpusReader {
    /// Planning attributes of `entity`.
    ///
    /// # Errors
    ///
    /// [`CorpusError::UnknownEntity`] when the entity does not exist, or a
    /// backend failure.
    fn entity_profile(&self, entity: &EntityRef) -> Result<EntityProfile, CorpusError>;

    /// Every demand of `entity` created on or before `as_of`, including
    /// finished and discarded ones.
    ///
    /// # Errors
    ///
    /// Backend failures or an unknown entity.
    fn demands_for(&self, entity: &EntityRef, as_of: NaiveDate)
    -> Result<Vec<DemandView>, CorpusError>;

    /// Entities sharing `entity`'s peer group that are active on `as_of`,
    /// `entity` itself included. An entity without a peer group is its own
    /// only peer.
    ///
    /// # Errors
    ///
    /// Backend failures or an unknown entity.
    fn peers(&self, entity: &EntityRef, as_of: NaiveDate) -> Result<Vec<EntityRef>, CorpusError>;

    /// All entities whose activity window contains `date`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn entities_active_on(&self, date: NaiveDate) -> Result<Vec<EntityRef>, CorpusError>;

    /// Work still to deliver: up-front scope plus demands in scope, minus
    /// deliveries. Never negative.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::entity_profile`] and [`Self::demands_for`] failures.
    fn remaining_scope(&self, entity: &EntityRef, as_of: NaiveDate) -> Result<u32, CorpusError> {
        let profile = self.entity_profile(entity)?;
        let demands = self.demands_for(entity, as_of)?;
        Ok(remaining_scope_of(&profile, &demands, as_of))
    }

    /// Whole weeks left until the deadline; `None` without a deadline.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::entity_profile`] failures.
    fn deadline_weeks_remaining(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<Option<u32>, CorpusError> {
        let profile = self.entity_profile(entity)?;
        Ok(profile.end_date.map(|deadline| weeks_until(as_of, deadline)))
    }

    /// Calendar days left until the deadline, negative once it has passed;
    /// `None` without a deadline.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::entity_profile`] failures.
    fn remaining_days(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<Option<i64>, CorpusError> {
        let profile = self.entity_profile(entity)?;
        Ok(profile.end_date.map(|deadline| (deadline - as_of).num_days()))
    }
}

/// `initial_scope + in-scope demands - delivered`, floored at zero.
#[must_use]
pub fn remaining_scope_of(profile: &EntityProfile, demands: &[DemandView], as_of: NaiveDate) -> u32 {
    let cutoff = day_cutoff(as_of);
    let in_scope = demands.iter().filter(|d| d.is_in_scope_at(cutoff)).count();
    let delivered = demands
        .iter()
        .filter(|d| d.is_in_scope_at(cutoff) && d.is_finished_by(cutoff))
        .count();

    let total = u64::from(profile.initial_scope) + in_scope as u64;
    let remaining = total.saturating_sub(delivered as u64);
    u32::try_from(remaining).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone)]
struct MemoryEntity {
    profile: EntityProfile,
    demands: Vec<DemandView>,
}

/// In-memory corpus keyed by entity.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    entities: BTreeMap<EntityRef, MemoryEntity>,
}

impl MemoryCorpus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an entity's profile, keeping its demands.
    pub fn insert_entity(&mut self, entity: EntityRef, profile: EntityProfile) {
        self.entities
            .entry(entity)
            .and_modify(|existing| existing.profile = profile.clone())
            .or_insert(MemoryEntity {
                profile,
                demands: Vec::new(),
            });
    }

    /// Attach a demand to an already registered entity.
    ///
    /// # Errors
    ///
    /// [`CorpusError::UnknownEntity`] when the entity was never inserted.
    pub fn add_demand(&mut self, entity: &EntityRef, demand: DemandView) -> Result<(), CorpusError> {
        let slot = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| CorpusError::UnknownEntity(entity.clone()))?;
        slot.demands.push(demand);
        Ok(())
    }

    fn entity(&self, entity: &EntityRef) -> Result<&MemoryEntity, CorpusError> {
        self.entities
            .get(entity)
            .ok_or_else(|| CorpusError::UnknownEntity(entity.clone()))
    }
}

impl DemandCorpusReader for MemoryCorpus {
    fn entity_profile(&self, entity: &EntityRef) -> Result<EntityProfile, CorpusError> {
        Ok(self.entity(entity)?.profile.clone())
    }

    fn demands_for(
        &self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<Vec<DemandView>, CorpusError> {
        let cutoff = day_cutoff(as_of);
        Ok(self
            .entity(entity)?
            .demands
            .iter()
            .filter(|demand| demand.is_created_by(cutoff))
            .cloned()
            .collect())
    }

    fn peers(&self, entity: &EntityRef, as_of: NaiveDate) -> Result<Vec<EntityRef>, CorpusError> {
        let own = self.entity(entity)?;
        let Some(group) = own.profile.peer_group.as_deref() else {
            return Ok(vec![entity.clone()]);
        };

        Ok(self
            .entities
            .iter()
            .filter(|(candidate, slot)| {
                *candidate == entity
                    || (candidate.kind == entity.kind
                        && slot.profile.peer_group.as_deref() == Some(group)
                        && slot.profile.is_active_on(as_of))
            })
            .map(|(candidate, _)| candidate.clone())
            .collect())
    }

    fn entities_active_on(&self, date: NaiveDate) -> Result<Vec<EntityRef>, CorpusError> {
        Ok(self
            .entities
            .iter()
            .filter(|(_, slot)| slot.profile.is_active_on(date))
            .map(|(entity, _)| entity.clone())
            .collect())
    }
}
