//! Read model consumed by the consolidation engine and the snapshot record it
//! produces.

pub mod demand;
pub mod entity;
pub mod snapshot;

pub use demand::DemandView;
pub use entity::{EntityKind, EntityProfile, EntityRef, ParseEnumError};
pub use snapshot::{
    ConsolidationSnapshot, ForecastFigures, LeadTimeFigures, PressureFigures, RollupMarkers,
    ScopeFigures, SnapshotKey, StoredSnapshot, ThroughputFigures,
};
