// gridloom-core/src/ports/dataset.rs

use async_trait::async_trait;

use crate::domain::snapshot::DatasetSnapshot;
use crate::error::GridloomError;

/// Resolves a dataset name from a gate definition into a materialized
/// snapshot the checks can evaluate. Silver gates resolve against in-memory
/// transform output; gold gates resolve against warehouse tables.
#[async_trait]
pub trait DatasetResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<DatasetSnapshot, GridloomError>;
}
