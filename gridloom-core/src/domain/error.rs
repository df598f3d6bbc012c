// gridloom-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Schema error in batch '{batch}': required column '{column}' is missing")]
    #[diagnostic(
        code(gridloom::domain::schema),
        help("Check the source config rename map against the raw payload field names.")
    )]
    MissingRequiredColumn { batch: String, column: String },

    #[error(
        "Cast failure rate too high on column '{column}': {rate:.1}% (threshold {threshold:.1}%)"
    )]
    #[diagnostic(
        code(gridloom::domain::cast_budget),
        help("The raw batch is likely corrupt; inspect the bronze payload before re-running.")
    )]
    ExcessiveCastFailure {
        column: String,
        rate: f64,
        threshold: f64,
    },

    #[error("Unknown check type '{check}' referenced by gate '{gate}'")]
    #[diagnostic(
        code(gridloom::domain::gate_config),
        help("Register the check in the CheckRegistry or fix the gate definition.")
    )]
    UnknownCheckType { gate: String, check: String },

    #[error("Gate '{gate}' is missing required criteria: {missing}")]
    #[diagnostic(code(gridloom::domain::gate_config))]
    IncompleteGate { gate: String, missing: String },

    #[error("Dataset '{0}' could not be resolved for gate evaluation")]
    #[diagnostic(code(gridloom::domain::dataset))]
    DatasetNotFound(String),

    #[error("Invalid source config '{source_name}': {reason}")]
    #[diagnostic(code(gridloom::domain::source_config))]
    InvalidSourceConfig { source_name: String, reason: String },

    #[error("Lifecycle violation: cannot move '{key}' from {from} to {to}")]
    #[diagnostic(
        code(gridloom::domain::lifecycle),
        help("Dimension status only moves forward; revival goes through the dimension loader.")
    )]
    LifecycleViolation {
        key: String,
        from: String,
        to: String,
    },
}
