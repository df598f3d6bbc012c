// gridloom-core/src/domain/silver/transform.rs

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use crate::domain::error::DomainError;
use crate::domain::record::{CleanedRecord, RawRecord};
use crate::domain::silver::config::SourceConfig;
use crate::domain::snapshot::DatasetSnapshot;
use crate::domain::value::Value;

/// Outcome of one Silver transform run.
///
/// Always returned short of fatal errors, so callers can log quality
/// metrics even for partially degraded batches. Writing partitions to
/// storage is the caller's responsibility.
#[derive(Debug, Default)]
pub struct TransformResult {
    pub source: String,
    pub partitions: BTreeMap<NaiveDate, Vec<CleanedRecord>>,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows dropped for a missing dedup-key or timestamp component.
    pub rows_dropped: usize,
    pub duplicates_removed: usize,
    pub cells_nulled: usize,
    pub cast_failures: BTreeMap<String, usize>,
    pub dropped_columns: BTreeSet<String>,
}

impl TransformResult {
    pub fn cleaned_rows(&self) -> impl Iterator<Item = &CleanedRecord> {
        self.partitions.values().flatten()
    }

    pub fn to_snapshot(&self) -> DatasetSnapshot {
        DatasetSnapshot::from_cleaned(self.source.clone(), self.cleaned_rows())
    }
}

/// Transform one raw batch (single source family) into a validated,
/// deduplicated, partitioned set of cleaned records.
///
/// Pipeline: rename → drop unknown columns → cast → dedup (latest
/// `observed_at` wins) → partition by calendar date. Empty batches are a
/// valid no-op. `processed_at` is injected so reruns are reproducible in
/// tests.
pub fn transform(
    raw_batch: &[RawRecord],
    config: &SourceConfig,
    processed_at: DateTime<Utc>,
) -> Result<TransformResult, DomainError> {
    let mut result = TransformResult {
        source: config.name.clone(),
        rows_in: raw_batch.len(),
        ..Default::default()
    };

    if raw_batch.is_empty() {
        debug!(source = %config.name, "Empty raw batch, nothing to transform");
        return Ok(result);
    }

    // 1. Rename + drop unknown columns. Track the observed column set so a
    //    missing required column fails the whole batch, not row by row.
    let mut seen_columns: BTreeSet<String> = BTreeSet::new();
    let mut staged: Vec<(BTreeMap<String, Value>, &RawRecord)> =
        Vec::with_capacity(raw_batch.len());

    for raw in raw_batch {
        let mut fields = BTreeMap::new();
        for (raw_name, value) in &raw.fields {
            let name = config
                .rename
                .get(raw_name)
                .cloned()
                .unwrap_or_else(|| raw_name.clone());
            if config.is_declared(&name) {
                seen_columns.insert(name.clone());
                fields.insert(name, value.clone());
            } else {
                result.dropped_columns.insert(name);
            }
        }
        staged.push((fields, raw));
    }

    if !result.dropped_columns.is_empty() {
        info!(
            source = %config.name,
            columns = ?result.dropped_columns,
            "Dropped undeclared columns"
        );
    }

    for spec in config.required_columns() {
        if !seen_columns.contains(&spec.name) {
            return Err(DomainError::MissingRequiredColumn {
                batch: raw_batch[0].batch_id.clone(),
                column: spec.name.clone(),
            });
        }
    }

    // 2. Cast cells to their declared types. Individual failures null the
    //    cell; the per-column budget decides whether the batch survives.
    let mut attempts: BTreeMap<String, usize> = BTreeMap::new();
    for (fields, _) in &mut staged {
        for spec in &config.columns {
            let Some(value) = fields.get(&spec.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            *attempts.entry(spec.name.clone()).or_default() += 1;
            match value.cast(spec.column_type) {
                Ok(cast) => {
                    fields.insert(spec.name.clone(), cast);
                }
                Err(_) => {
                    fields.insert(spec.name.clone(), Value::Null);
                    result.cells_nulled += 1;
                    *result.cast_failures.entry(spec.name.clone()).or_default() += 1;
                }
            }
        }
    }

    for (column, failures) in &result.cast_failures {
        let attempted = attempts.get(column).copied().unwrap_or(0);
        if attempted == 0 {
            continue;
        }
        let rate = *failures as f64 / attempted as f64;
        if rate > config.cast_failure_threshold {
            return Err(DomainError::ExcessiveCastFailure {
                column: column.clone(),
                rate: rate * 100.0,
                threshold: config.cast_failure_threshold * 100.0,
            });
        }
    }

    // 3. Deduplicate on the composite key: the most recently observed row
    //    (provenance timestamp) wins deterministically; on an exact tie the
    //    earlier row in the batch is kept.
    let mut deduped: HashMap<String, CleanedRecord> = HashMap::with_capacity(staged.len());
    for (fields, raw) in staged {
        let record = CleanedRecord {
            source: config.name.clone(),
            batch_id: raw.batch_id.clone(),
            observed_at: raw.observed_at,
            processed_at,
            fields,
        };

        let has_timestamp = record.timestamp(&config.timestamp_column).is_some();
        let Some(key) = record.composite_key(&config.dedup_keys) else {
            result.rows_dropped += 1;
            continue;
        };
        if !has_timestamp {
            result.rows_dropped += 1;
            continue;
        }

        match deduped.get(&key) {
            Some(existing) if existing.observed_at >= record.observed_at => {
                result.duplicates_removed += 1;
            }
            Some(_) => {
                result.duplicates_removed += 1;
                deduped.insert(key, record);
            }
            None => {
                deduped.insert(key, record);
            }
        }
    }

    // 4. Partition by the calendar date of the record timestamp.
    for record in deduped.into_values() {
        // Timestamp presence was checked above.
        let Some(ts) = record.timestamp(&config.timestamp_column) else {
            result.rows_dropped += 1;
            continue;
        };
        result
            .partitions
            .entry(ts.date_naive())
            .or_default()
            .push(record);
    }
    for rows in result.partitions.values_mut() {
        rows.sort_by(|a, b| {
            a.composite_key(&config.dedup_keys)
                .cmp(&b.composite_key(&config.dedup_keys))
        });
    }
    result.rows_out = result.partitions.values().map(Vec::len).sum();

    info!(
        source = %config.name,
        rows_in = result.rows_in,
        rows_out = result.rows_out,
        duplicates = result.duplicates_removed,
        dropped = result.rows_dropped,
        nulled = result.cells_nulled,
        "Silver transform complete"
    );

    Ok(result)
}
