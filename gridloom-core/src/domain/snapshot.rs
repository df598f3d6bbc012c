// gridloom-core/src/domain/snapshot.rs

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::record::CleanedRecord;
use crate::domain::value::Value;

/// A materialized, read-only view of one dataset at one point in time.
///
/// This is what quality checks evaluate: a plain row store with a known
/// column set, built either from an in-memory transform result or from a
/// warehouse table. Checks stay pure because they never touch storage.
#[derive(Debug, Clone, Default)]
pub struct DatasetSnapshot {
    pub name: String,
    columns: BTreeSet<String>,
    rows: Vec<BTreeMap<String, Value>>,
}

impl DatasetSnapshot {
    pub fn new(name: impl Into<String>, rows: Vec<BTreeMap<String, Value>>) -> Self {
        let columns = rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>();
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn from_cleaned<'a>(
        name: impl Into<String>,
        records: impl IntoIterator<Item = &'a CleanedRecord>,
    ) -> Self {
        let rows = records.into_iter().map(|r| r.fields.clone()).collect();
        Self::new(name, rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn rows(&self) -> &[BTreeMap<String, Value>] {
        &self.rows
    }

    /// Number of null (or absent) cells in the column.
    pub fn null_count(&self, column: &str) -> usize {
        self.rows
            .iter()
            .filter(|row| row.get(column).map(Value::is_null).unwrap_or(true))
            .count()
    }

    /// Non-null numeric values of a column.
    pub fn numeric_values(&self, column: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_f64))
            .collect()
    }

    /// Latest timestamp observed in the column, if any cell parses.
    pub fn max_timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_timestamp))
            .max()
    }

    /// Distinct rendered values of a column, nulls excluded. Used for FK
    /// membership checks against a dimension snapshot.
    pub fn distinct_values(&self, column: &str) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .collect()
    }
}
