// gridloom-core/src/domain/quality/mod.rs

pub mod checks;
pub mod gate;
pub mod registry;

pub use gate::{GateDefinition, GateResult, Layer, QualityReport, Severity, Verdict};
pub use registry::{CheckContext, CheckFn, CheckRegistry};
