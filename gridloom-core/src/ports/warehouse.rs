// gridloom-core/src/ports/warehouse.rs
//
// The contract between the loaders and the storage engine. The application
// layer only ever sees this trait; the DuckDB adapter lives in
// infrastructure and is the single writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::warehouse::{
    DimensionKind, DimensionRecency, FactRow, LifecycleStatus, RegionCandidate, SourceCandidate,
    TimeSlot,
};
use crate::error::GridloomError;

/// What an idempotent dimension write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created with a fresh surrogate key.
    Inserted,
    /// The natural key already existed; attributes and last_seen_at were
    /// refreshed, the surrogate key untouched.
    Refreshed,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the star schema if it does not exist yet. Safe to call on
    /// every run.
    async fn ensure_schema(&self) -> Result<(), GridloomError>;

    // --- Dimension writes (idempotent on the natural key) ---

    async fn upsert_region(
        &self,
        candidate: &RegionCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, GridloomError>;

    async fn upsert_time_slot(&self, slot: &TimeSlot) -> Result<UpsertOutcome, GridloomError>;

    async fn upsert_source(
        &self,
        candidate: &SourceCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, GridloomError>;

    // --- Surrogate key lookups ---

    async fn region_key(&self, code: &str) -> Result<Option<i64>, GridloomError>;

    async fn time_key(&self, instant: DateTime<Utc>) -> Result<Option<i64>, GridloomError>;

    async fn source_key(&self, name: &str) -> Result<Option<i64>, GridloomError>;

    // --- Fact writes ---

    /// Insert the row unless its (time, region, source) grain already exists.
    /// Returns true when a row was written.
    async fn insert_fact_if_absent(&self, row: &FactRow) -> Result<bool, GridloomError>;

    /// Replace whatever sits at the row's grain. Correction mode only.
    async fn overwrite_fact(&self, row: &FactRow) -> Result<(), GridloomError>;

    async fn fact_count(&self) -> Result<u64, GridloomError>;

    // --- Lifecycle ---

    /// All members of a dimension with their natural key, last_seen_at and
    /// current status, for the staleness sweep.
    async fn dimension_recency(
        &self,
        kind: DimensionKind,
    ) -> Result<Vec<DimensionRecency>, GridloomError>;

    /// Move one member's status, guarded by its expected current status.
    /// Returns false when the row no longer matches `from` (lost race or
    /// concurrent sweep), which the caller logs and skips.
    async fn advance_status(
        &self,
        kind: DimensionKind,
        natural_key: &str,
        from: LifecycleStatus,
        to: LifecycleStatus,
    ) -> Result<bool, GridloomError>;
}
