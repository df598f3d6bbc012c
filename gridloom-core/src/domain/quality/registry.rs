// gridloom-core/src/domain/quality/registry.rs

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::error::DomainError;
use crate::domain::quality::checks;
use crate::domain::quality::gate::{GateDefinition, Verdict};
use crate::domain::snapshot::DatasetSnapshot;

/// Everything a check may look at: the target dataset, any reference
/// datasets the gate names, and the evaluation clock.
pub struct CheckContext<'a> {
    pub dataset: &'a DatasetSnapshot,
    pub references: &'a HashMap<String, DatasetSnapshot>,
    pub reference_time: DateTime<Utc>,
}

impl CheckContext<'_> {
    pub fn reference(&self, name: &str) -> Result<&DatasetSnapshot, DomainError> {
        self.references
            .get(name)
            .ok_or_else(|| DomainError::DatasetNotFound(name.to_string()))
    }
}

/// A pure check implementation: `(context, gate) → (verdict, message)`.
pub type CheckFn = fn(&CheckContext<'_>, &GateDefinition) -> Result<(Verdict, String), DomainError>;

/// Static dispatch table from check-type name to implementation.
///
/// Built once at startup. Adding a check type is a local `register` call;
/// the gate runner's control flow never changes.
pub struct CheckRegistry {
    checks: HashMap<String, CheckFn>,
}

impl Default for CheckRegistry {
    fn default() -> Self {
        let mut registry = Self {
            checks: HashMap::new(),
        };
        registry.register("row_count", checks::row_count);
        registry.register("null_check", checks::null_check);
        registry.register("range_check", checks::range_check);
        registry.register("freshness_check", checks::freshness_check);
        registry.register("fk_exists", checks::fk_exists);
        registry
    }
}

impl CheckRegistry {
    pub fn register(&mut self, name: impl Into<String>, check: CheckFn) {
        self.checks.insert(name.into(), check);
    }

    pub fn get(&self, name: &str) -> Option<CheckFn> {
        self.checks.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
