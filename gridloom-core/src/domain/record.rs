// gridloom-core/src/domain/record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::value::Value;

/// One raw record as delivered into Bronze by an ingestion collaborator.
///
/// Immutable once ingested. `observed_at` is the provenance timestamp used
/// to break ties during deduplication; `batch_id` identifies the ingestion
/// batch for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub batch_id: String,
    pub observed_at: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

impl RawRecord {
    pub fn new(
        batch_id: impl Into<String>,
        observed_at: DateTime<Utc>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            observed_at,
            fields,
        }
    }
}

/// A normalized Silver record: typed fields plus a provenance stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub source: String,
    pub batch_id: String,
    pub observed_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

impl CleanedRecord {
    /// Field access with `Null` as the absent value.
    pub fn field(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Composite natural key over the given columns, or `None` if any
    /// component is missing or null. The rendering is stable, so equal keys
    /// mean equal component values.
    pub fn composite_key(&self, key_columns: &[String]) -> Option<String> {
        let mut parts = Vec::with_capacity(key_columns.len());
        for col in key_columns {
            let value = self.field(col);
            if value.is_null() {
                return None;
            }
            parts.push(value.to_string());
        }
        Some(parts.join("|"))
    }

    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        self.field(column).as_timestamp()
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.field(column).as_f64()
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        match self.field(column) {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}
