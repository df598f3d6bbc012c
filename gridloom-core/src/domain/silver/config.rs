// gridloom-core/src/domain/silver/config.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::DomainError;
use crate::domain::value::ColumnType;

/// One declared Silver column: its cleaned name, target type, and whether
/// the raw batch must contain it at all.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ColumnSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    #[serde(default)]
    pub required: bool,
}

fn default_cast_failure_threshold() -> f64 {
    0.2
}

/// Declarative transform rules for one raw source family.
///
/// Loaded once per source from the project config; the transform itself is a
/// pure function over (batch, config), so this struct is testable without
/// any I/O.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub name: String,

    /// Raw field name → cleaned column name.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Declared columns (post-rename). Anything else in the raw payload is
    /// dropped.
    pub columns: Vec<ColumnSpec>,

    /// Composite deduplication key (cleaned column names).
    pub dedup_keys: Vec<String>,

    /// Timestamp column driving partitioning and the time dimension.
    pub timestamp_column: String,

    #[serde(default)]
    pub region_code_column: Option<String>,

    #[serde(default)]
    pub region_name_column: Option<String>,

    /// Measurement columns → energy source name (wide → long unpivot at
    /// fact-load time).
    #[serde(default)]
    pub measures: BTreeMap<String, String>,

    #[serde(default)]
    pub temperature_column: Option<String>,

    #[serde(default)]
    pub price_column: Option<String>,

    /// Maximum tolerated per-column cast failure rate (fraction of attempted
    /// casts) before the batch is aborted.
    #[serde(default = "default_cast_failure_threshold")]
    pub cast_failure_threshold: f64,
}

impl SourceConfig {
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }

    /// Structural validation, run once at config-load time so that a broken
    /// definition fails the run before any data is touched.
    pub fn validate(&self) -> Result<(), DomainError> {
        let fail = |reason: String| DomainError::InvalidSourceConfig {
            source_name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(fail("source name is empty".into()));
        }
        if self.dedup_keys.is_empty() {
            return Err(fail("dedup_keys must not be empty".into()));
        }
        for key in &self.dedup_keys {
            if !self.is_declared(key) {
                return Err(fail(format!("dedup key '{key}' is not a declared column")));
            }
        }
        match self.column_type(&self.timestamp_column) {
            Some(ColumnType::Timestamp) => {}
            Some(_) => {
                return Err(fail(format!(
                    "timestamp column '{}' must be declared with type 'timestamp'",
                    self.timestamp_column
                )));
            }
            None => {
                return Err(fail(format!(
                    "timestamp column '{}' is not a declared column",
                    self.timestamp_column
                )));
            }
        }
        for measure in self.measures.keys() {
            if !self.is_declared(measure) {
                return Err(fail(format!(
                    "measure column '{measure}' is not a declared column"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.cast_failure_threshold) {
            return Err(fail(format!(
                "cast_failure_threshold {} must be within [0, 1]",
                self.cast_failure_threshold
            )));
        }
        Ok(())
    }
}
