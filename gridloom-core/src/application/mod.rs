// gridloom-core/src/application/mod.rs

pub mod dimension_loader;
pub mod fact_loader;
pub mod gate_runner;
pub mod lifecycle;
pub mod pipeline;

pub use dimension_loader::{UpsertSummary, upsert_dimensions};
pub use fact_loader::{LoadSummary, load_facts};
pub use gate_runner::{SnapshotResolver, run_gates};
pub use lifecycle::{SweepSummary, sweep_staleness};
pub use pipeline::{RunResult, run_pipeline};
