use std::fmt;

use crate::model::EntityRef;

/// Machine-readable error codes for job runners and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    EntityNotFound,
    InvalidEnumValue,
    InvalidDateRange,
    CorpusUnavailable,
    CorruptStore,
    StoreWriteFailed,
    ImportFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::EntityNotFound => "E2001",
            Self::InvalidEnumValue => "E2002",
            Self::InvalidDateRange => "E2003",
            Self::CorpusUnavailable => "E3001",
            Self::CorruptStore => "E3002",
            Self::StoreWriteFailed => "E5001",
            Self::ImportFailed => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::EntityNotFound => "Entity not found",
            Self::InvalidEnumValue => "Invalid entity kind value",
            Self::InvalidDateRange => "Invalid date range",
            Self::CorpusUnavailable => "Demand corpus unavailable",
            Self::CorruptStore => "Corrupt snapshot store",
            Self::StoreWriteFailed => "Snapshot write failed",
            Self::ImportFailed => "Corpus import failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `fc init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .flowcast/config.toml and retry."),
            Self::EntityNotFound => Some("Import the entity first with `fc import`."),
            Self::InvalidEnumValue => Some("Use one of: project, team, customer, contract."),
            Self::InvalidDateRange => Some("The range start must not be after its end."),
            Self::CorpusUnavailable => Some("Retry the run; the snapshot is recomputed from scratch."),
            Self::CorruptStore => Some("Inspect the database; snapshots can be rebuilt by backfill."),
            Self::StoreWriteFailed => Some("Check disk space and write permissions, then retry."),
            Self::ImportFailed => Some("Validate the corpus JSON document and retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure reading from the demand corpus.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityRef),
    #[error("corpus query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corpus row is malformed: {0}")]
    Malformed(String),
}

impl CorpusError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownEntity(_) => ErrorCode::EntityNotFound,
            Self::Sqlite(_) => ErrorCode::CorpusUnavailable,
            Self::Malformed(_) => ErrorCode::CorruptStore,
        }
    }
}

/// Failure reading or writing consolidation snapshots.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("snapshot payload encode/decode error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("snapshot row is malformed: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Sqlite(_) => ErrorCode::StoreWriteFailed,
            Self::Codec(_) | Self::Malformed(_) => ErrorCode::CorruptStore,
        }
    }
}
