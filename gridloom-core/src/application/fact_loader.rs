// gridloom-core/src/application/fact_loader.rs
//
// Fact population: unpivot measure columns into (time, region, source) grain
// rows, resolve every natural key to its surrogate, derive the load factor,
// and write through the Warehouse port. Facts are append-only: the default
// mode skips existing grains, correction mode overwrites them explicitly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::record::CleanedRecord;
use crate::domain::silver::SourceConfig;
use crate::domain::warehouse::{CapacityReference, FactRow, LoadMode};
use crate::error::GridloomError;
use crate::ports::audit::{AuditEvent, AuditSink};
use crate::ports::warehouse::Warehouse;

#[derive(Debug, Default, Serialize, Clone)]
pub struct LoadSummary {
    /// Measure cells that produced a fact candidate (non-null measurement
    /// with a timestamp and region).
    pub candidates: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub overwritten: usize,
    /// Candidates excluded because a dimension key failed to resolve.
    pub orphans: usize,
    /// Set when the orphan rate crossed the configured warning threshold.
    pub orphan_warning: bool,
}

impl LoadSummary {
    pub fn orphan_pct(&self) -> f64 {
        if self.candidates == 0 {
            0.0
        } else {
            self.orphans as f64 / self.candidates as f64 * 100.0
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn load_facts(
    records: &[CleanedRecord],
    config: &SourceConfig,
    capacity: &CapacityReference,
    mode: LoadMode,
    orphan_warn_pct: f64,
    store: &dyn Warehouse,
    audit: &dyn AuditSink,
    now: DateTime<Utc>,
) -> Result<LoadSummary, GridloomError> {
    let mut summary = LoadSummary::default();

    if config.measures.is_empty() {
        info!(source = %config.name, "Source declares no measures, nothing to load");
        return Ok(summary);
    }
    let Some(code_column) = &config.region_code_column else {
        info!(source = %config.name, "Source has no region column, nothing to load");
        return Ok(summary);
    };

    for record in records {
        let Some(ts) = record.timestamp(&config.timestamp_column) else {
            continue;
        };
        let Some(region_code) = record.text(code_column) else {
            continue;
        };

        for (measure_column, source_name) in &config.measures {
            // A null measurement is an absent reading, not an orphan.
            let Some(measured_mw) = record.float(measure_column) else {
                continue;
            };
            summary.candidates += 1;

            let time_key = store.time_key(ts).await?;
            let region_key = store.region_key(region_code).await?;
            let source_key = store.source_key(source_name).await?;
            let (Some(time_key), Some(region_key), Some(source_key)) =
                (time_key, region_key, source_key)
            else {
                summary.orphans += 1;
                warn!(
                    source = %config.name,
                    region = region_code,
                    energy_source = source_name,
                    "Orphan fact excluded: dimension key not resolved"
                );
                audit
                    .record(AuditEvent::warning(
                        "fact_loader",
                        "orphan_excluded",
                        serde_json::json!({
                            "source": config.name,
                            "region_code": region_code,
                            "energy_source": source_name,
                            "measured_at": ts.to_rfc3339(),
                        }),
                    ))
                    .await?;
                continue;
            };

            let row = FactRow {
                time_key,
                region_key,
                source_key,
                measured_mw,
                load_factor: capacity.load_factor(region_code, source_name, measured_mw),
                temperature_c: config
                    .temperature_column
                    .as_ref()
                    .and_then(|c| record.float(c)),
                price_mwh: config.price_column.as_ref().and_then(|c| record.float(c)),
                batch_id: record.batch_id.clone(),
                loaded_at: now,
            };

            match mode {
                LoadMode::Append => {
                    if store.insert_fact_if_absent(&row).await? {
                        summary.inserted += 1;
                    } else {
                        summary.skipped_existing += 1;
                    }
                }
                LoadMode::Correction => {
                    store.overwrite_fact(&row).await?;
                    summary.overwritten += 1;
                }
            }
        }
    }

    if summary.orphan_pct() > orphan_warn_pct {
        summary.orphan_warning = true;
        warn!(
            source = %config.name,
            orphan_pct = summary.orphan_pct(),
            threshold = orphan_warn_pct,
            "Orphan rate over threshold"
        );
    }

    audit
        .record(AuditEvent::info(
            "fact_loader",
            "facts_loaded",
            serde_json::json!({
                "source": config.name,
                "mode": mode.as_str(),
                "candidates": summary.candidates,
                "inserted": summary.inserted,
                "skipped_existing": summary.skipped_existing,
                "overwritten": summary.overwritten,
                "orphans": summary.orphans,
            }),
        ))
        .await?;

    info!(
        source = %config.name,
        inserted = summary.inserted,
        skipped = summary.skipped_existing,
        overwritten = summary.overwritten,
        orphans = summary.orphans,
        "Fact load complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::dimension_loader::upsert_dimensions;
    use crate::domain::value::Value;
    use crate::domain::warehouse::default_source_catalog;
    use crate::infrastructure::duckdb::DuckDbWarehouse;
    use crate::ports::audit::TracingAuditSink;
    use anyhow::Result;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn config() -> SourceConfig {
        serde_yaml::from_str(
            r#"
name: grid_production
columns:
  - { name: measured_at, type: timestamp, required: true }
  - { name: region_code, type: text, required: true }
  - { name: wind_mw, type: float }
  - { name: solar_mw, type: float }
dedup_keys: [region_code, measured_at]
timestamp_column: measured_at
region_code_column: region_code
measures:
  wind_mw: wind
  solar_mw: solar
"#,
        )
        .unwrap()
    }

    fn record(code: &str, wind: Option<f64>, solar: Option<f64>) -> CleanedRecord {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let mut fields: BTreeMap<String, Value> = BTreeMap::new();
        fields.insert("measured_at".into(), Value::Timestamp(ts));
        fields.insert("region_code".into(), Value::Text(code.into()));
        fields.insert("wind_mw".into(), wind.map(Value::Float).unwrap_or(Value::Null));
        fields.insert("solar_mw".into(), solar.map(Value::Float).unwrap_or(Value::Null));
        CleanedRecord {
            source: "grid_production".into(),
            batch_id: "b1".into(),
            observed_at: ts,
            processed_at: ts,
            fields,
        }
    }

    fn capacity() -> CapacityReference {
        CapacityReference::new([("11|wind".to_string(), 1000.0)].into_iter().collect())
    }

    async fn prepared(records: &[CleanedRecord]) -> Result<DuckDbWarehouse> {
        let wh = DuckDbWarehouse::new(":memory:")?;
        wh.ensure_schema().await?;
        upsert_dimensions(records, &config(), &default_source_catalog(), &wh, Utc::now()).await?;
        Ok(wh)
    }

    #[tokio::test]
    async fn test_append_is_idempotent() -> Result<()> {
        let records = vec![record("11", Some(250.0), Some(40.0))];
        let wh = prepared(&records).await?;
        let audit = TracingAuditSink;
        let now = Utc::now();

        let first = load_facts(
            &records, &config(), &capacity(), LoadMode::Append, 10.0, &wh, &audit, now,
        )
        .await?;
        assert_eq!(first.inserted, 2);
        assert_eq!(first.orphans, 0);

        let second = load_facts(
            &records, &config(), &capacity(), LoadMode::Append, 10.0, &wh, &audit, now,
        )
        .await?;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(wh.fact_count().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_factor_only_with_capacity() -> Result<()> {
        let records = vec![record("11", Some(250.0), Some(40.0))];
        let wh = prepared(&records).await?;

        load_facts(
            &records,
            &config(),
            &capacity(),
            LoadMode::Append,
            10.0,
            &wh,
            &TracingAuditSink,
            Utc::now(),
        )
        .await?;

        let (_, rows) = wh.query_rows(
            "SELECT s.source_name, f.load_factor
             FROM fact_energy_flow f JOIN dim_source s USING (source_key)
             ORDER BY s.source_name",
        )?;
        // solar has no capacity entry -> null load factor (rendered empty)
        assert_eq!(rows[0][0], "solar");
        assert_eq!(rows[0][1], "");
        assert_eq!(rows[1][0], "wind");
        assert_eq!(rows[1][1], "0.25");
        Ok(())
    }

    #[tokio::test]
    async fn test_orphans_excluded_and_flagged() -> Result<()> {
        let known = record("11", Some(250.0), None);
        let unknown = record("99", Some(10.0), None);
        // Only the known region's dimensions are loaded.
        let wh = prepared(&[known.clone()]).await?;

        let summary = load_facts(
            &[known, unknown],
            &config(),
            &capacity(),
            LoadMode::Append,
            10.0,
            &wh,
            &TracingAuditSink,
            Utc::now(),
        )
        .await?;
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.orphans, 1);
        assert!(summary.orphan_warning); // 50% > 10%
        assert_eq!(wh.fact_count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_correction_overwrites() -> Result<()> {
        let original = vec![record("11", Some(250.0), None)];
        let wh = prepared(&original).await?;
        let audit = TracingAuditSink;

        load_facts(
            &original, &config(), &capacity(), LoadMode::Append, 10.0, &wh, &audit,
            Utc::now(),
        )
        .await?;

        let restated = vec![record("11", Some(300.0), None)];
        let summary = load_facts(
            &restated, &config(), &capacity(), LoadMode::Correction, 10.0, &wh, &audit,
            Utc::now(),
        )
        .await?;
        assert_eq!(summary.overwritten, 1);
        assert_eq!(wh.fact_count().await?, 1);

        let (_, rows) = wh.query_rows("SELECT measured_mw FROM fact_energy_flow")?;
        assert_eq!(rows[0][0], "300");
        Ok(())
    }
}
