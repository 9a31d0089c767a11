#![forbid(unsafe_code)]
//! flowcast-engine: turns a demand corpus into daily consolidation snapshots.
//!
//! [`SnapshotBuilder`] computes and upserts one snapshot per `(entity, date)`;
//! [`BatchRunner`] fans a day's entities out over a worker pool, isolating
//! failures per entity.

pub mod builder;
pub mod error;
pub mod runner;

pub use builder::{BuilderSettings, ConsolidationReport, SnapshotBuilder, derive_seed};
pub use error::ConsolidationError;
pub use runner::{
    BatchFailure, BatchReport, BatchRunner, ConsolidationWorker, SharedWorker, SqliteWorker,
};
