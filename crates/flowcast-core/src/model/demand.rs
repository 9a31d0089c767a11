use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only view of one demand's lifecycle as exposed by the corpus.
///
/// All "as of" predicates take an exclusive `cutoff` instant: an event counts
/// as having happened when its timestamp is strictly before the cutoff. The
/// engine uses the midnight following the consolidation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub commitment_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discarded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effort_upstream: f64,
    #[serde(default)]
    pub effort_downstream: f64,
}

impl DemandView {
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            commitment_at: None,
            finished_at: None,
            discarded_at: None,
            effort_upstream: 0.0,
            effort_downstream: 0.0,
        }
    }

    /// Commitment-to-finish duration in whole seconds.
    ///
    /// `None` unless both timestamps are present. A finish recorded before the
    /// commitment is treated as missing data rather than a negative duration.
    #[must_use]
    pub fn lead_time_seconds(&self) -> Option<i64> {
        let committed = self.commitment_at?;
        let finished = self.finished_at?;
        let seconds = (finished - committed).num_seconds();
        (seconds >= 0).then_some(seconds)
    }

    #[must_use]
    pub fn is_created_by(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }

    #[must_use]
    pub fn is_discarded_by(&self, cutoff: DateTime<Utc>) -> bool {
        self.discarded_at.is_some_and(|at| at < cutoff)
    }

    /// Delivered before `cutoff`.
    ///
    /// A finish that happened before a later discard still counts: discarding
    /// does not rewrite delivery history. A finish stamped after the discard
    /// does not.
    #[must_use]
    pub fn is_finished_by(&self, cutoff: DateTime<Utc>) -> bool {
        let Some(finished) = self.finished_at else {
            return false;
        };
        finished < cutoff && self.discarded_at.is_none_or(|discarded| finished <= discarded)
    }

    /// Part of the active scope: created and not discarded as of `cutoff`.
    #[must_use]
    pub fn is_in_scope_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_created_by(cutoff) && !self.is_discarded_by(cutoff)
    }

    /// Committed, not finished and not discarded as of `cutoff`.
    #[must_use]
    pub fn is_wip_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.commitment_at.is_some_and(|at| at < cutoff)
            && !self.finished_at.is_some_and(|at| at < cutoff)
            && !self.is_discarded_by(cutoff)
    }
}
