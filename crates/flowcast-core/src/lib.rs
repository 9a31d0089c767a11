#![forbid(unsafe_code)]
//! flowcast-core library.
//!
//! Read model for demands and entities, the consolidation snapshot record,
//! and the two collaborator seams the engine talks to:
//!
//! - [`corpus::DemandCorpusReader`]: read-only view of demands per entity
//! - [`store::SnapshotStore`]: keyed upsert of daily snapshots
//!
//! Both have in-memory implementations and SQLite implementations under [`db`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at collaborator boundaries, `anyhow::Result`
//!   for glue code.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod calendar;
pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod model;
pub mod store;
