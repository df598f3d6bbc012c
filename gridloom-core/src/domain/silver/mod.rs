// gridloom-core/src/domain/silver/mod.rs

pub mod config;
pub mod transform;

pub use config::{ColumnSpec, SourceConfig};
pub use transform::{TransformResult, transform};
