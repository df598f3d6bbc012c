// gridloom-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridloomError {
    // --- DOMAIN ERRORS (Schema, cast budget, gate configuration) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, YAML, warehouse engine) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- GENERIC / APPLICATION ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Unsafe path traversal detected: {0}")]
    UnsafePath(String),
}

// Manual implementations to avoid duplicate enum variants but keep ergonomics
impl From<std::io::Error> for GridloomError {
    fn from(err: std::io::Error) -> Self {
        GridloomError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for GridloomError {
    fn from(err: duckdb::Error) -> Self {
        GridloomError::Infrastructure(InfrastructureError::from(err))
    }
}
