use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The four aggregate levels a snapshot can be consolidated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Team,
    Customer,
    Contract,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [Self::Project, Self::Team, Self::Customer, Self::Contract];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Team => "team",
            Self::Customer => "customer",
            Self::Contract => "contract",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "team" => Ok(Self::Team),
            "customer" => Ok(Self::Customer),
            "contract" => Ok(Self::Contract),
            _ => Err(ParseEnumError {
                expected: "entity kind",
                got: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

/// Identity of one consolidation target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn project(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Project, id)
    }

    #[must_use]
    pub fn team(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Team, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Planning attributes of an entity that are not derived from its demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub start_date: NaiveDate,
    /// Deadline. `None` means the entity has no committed end date.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Scope known up-front that has not been broken down into demands yet.
    #[serde(default)]
    pub initial_scope: u32,
    #[serde(default)]
    pub wip_limit: u32,
    /// Entities sharing a peer group are compared against each other for
    /// relative flow pressure (e.g. the projects of one team).
    #[serde(default)]
    pub peer_group: Option<String>,
}

impl EntityProfile {
    /// An entity is active from its start date through its end date inclusive.
    #[must_use]
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.is_none_or(|end| date <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_text() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>(), Ok(kind));
        }
        assert_eq!(" Team ".parse::<EntityKind>(), Ok(EntityKind::Team));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "company".parse::<EntityKind>().expect_err("should fail");
        assert_eq!(err.to_string(), "invalid entity kind: 'company'");
    }

    #[test]
    fn entity_ref_displays_kind_and_id() {
        assert_eq!(EntityRef::project("p-1").to_string(), "project:p-1");
    }

    #[test]
    fn activity_window_is_inclusive() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).expect("valid date");
        let profile = EntityProfile {
            start_date: day(4),
            end_date: Some(day(8)),
            initial_scope: 0,
            wip_limit: 0,
            peer_group: None,
        };
        assert!(!profile.is_active_on(day(3)));
        assert!(profile.is_active_on(day(4)));
        assert!(profile.is_active_on(day(8)));
        assert!(!profile.is_active_on(day(9)));

        let open_ended = EntityProfile {
            end_date: None,
            ..profile
        };
        assert!(open_ended.is_active_on(day(30)));
    }
}
