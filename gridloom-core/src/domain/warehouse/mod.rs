// gridloom-core/src/domain/warehouse/mod.rs

pub mod dimensions;
pub mod facts;

pub use dimensions::{
    DimensionKind, DimensionRecency, LifecycleStatus, LifecycleThresholds, RegionCandidate,
    SourceCandidate, TimeSlot, default_source_catalog,
};
pub use facts::{CapacityReference, FactRow, LoadMode};
