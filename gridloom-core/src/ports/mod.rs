// gridloom-core/src/ports/mod.rs

pub mod audit;
pub mod dataset;
pub mod warehouse;

pub use audit::{AuditEvent, AuditSink};
pub use dataset::DatasetResolver;
pub use warehouse::{UpsertOutcome, Warehouse};
