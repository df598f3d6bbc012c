// gridloom-core/src/infrastructure/mod.rs

pub mod audit;
pub mod bronze;
pub mod config;
pub mod duckdb;
pub mod error;
pub mod fs;
pub mod silver;

pub use config::{PipelineThresholds, ProjectConfig, load_project_config};
pub use error::InfrastructureError;
pub use self::duckdb::DuckDbWarehouse;
