use flowcast_core::error::{CorpusError, ErrorCode, StoreError};
use flowcast_core::model::{EntityRef, SnapshotKey};

/// Typed failure of a single consolidation run.
///
/// Insufficient data is never an error; only collaborator failures end up
/// here.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    #[error("reading corpus for {entity} failed: {source}")]
    Corpus {
        entity: EntityRef,
        #[source]
        source: CorpusError,
    },
    #[error("persisting snapshot {key} failed: {source}")]
    Store {
        key: SnapshotKey,
        #[source]
        source: StoreError,
    },
}

impl ConsolidationError {
    pub(crate) fn corpus(entity: &EntityRef) -> impl FnOnce(CorpusError) -> Self + '_ {
        move |source| Self::Corpus {
            entity: entity.clone(),
            source,
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Corpus { source, .. } => source.code(),
            Self::Store { source, .. } => source.code(),
        }
    }

    /// The entity whose run failed.
    #[must_use]
    pub const fn entity(&self) -> &EntityRef {
        match self {
            Self::Corpus { entity, .. } => entity,
            Self::Store { key, .. } => &key.entity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn codes_follow_the_source() {
        let entity = EntityRef::project("p-9");
        let missing = ConsolidationError::corpus(&entity)(CorpusError::UnknownEntity(entity.clone()));
        assert_eq!(missing.code(), ErrorCode::EntityNotFound);
        assert_eq!(missing.entity(), &entity);

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let corrupt = ConsolidationError::Store {
            key: SnapshotKey::new(entity.clone(), date),
            source: StoreError::Malformed("bad row".into()),
        };
        assert_eq!(corrupt.code(), ErrorCode::CorruptStore);
        assert!(corrupt.to_string().contains("project:p-9@2024-01-01"));
    }
}
