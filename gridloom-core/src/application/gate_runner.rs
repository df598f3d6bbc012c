// gridloom-core/src/application/gate_runner.rs
//
// Declarative gate evaluation. The runner resolves datasets through the
// DatasetResolver port, dispatches each gate by check-type name and collects
// a QualityReport. It only reports: halting on a CRITICAL failure is the
// pipeline driver's decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::domain::error::DomainError;
use crate::domain::quality::{
    CheckContext, CheckRegistry, GateDefinition, GateResult, Layer, QualityReport, Verdict,
};
use crate::domain::snapshot::DatasetSnapshot;
use crate::error::GridloomError;
use crate::ports::dataset::DatasetResolver;

/// In-memory resolver over pre-materialized snapshots. Used for the Silver
/// layer, where the datasets under evaluation are transform outputs that
/// have not been persisted yet.
#[derive(Default)]
pub struct SnapshotResolver {
    snapshots: HashMap<String, DatasetSnapshot>,
}

impl SnapshotResolver {
    pub fn insert(&mut self, snapshot: DatasetSnapshot) {
        self.snapshots.insert(snapshot.name.clone(), snapshot);
    }
}

#[async_trait]
impl DatasetResolver for SnapshotResolver {
    async fn resolve(&self, name: &str) -> Result<DatasetSnapshot, GridloomError> {
        self.snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::DatasetNotFound(name.to_string()).into())
    }
}

/// Evaluate every gate definition against its resolved datasets.
///
/// An unknown check type is a configuration error and aborts the whole
/// evaluation; a misconfigured gate must never be silently skipped.
pub async fn run_gates(
    defs: &[GateDefinition],
    layer: Layer,
    resolver: &dyn DatasetResolver,
    registry: &CheckRegistry,
    run_id: &str,
    now: DateTime<Utc>,
) -> Result<QualityReport, GridloomError> {
    let mut results = Vec::new();

    for def in defs.iter().filter(|d| d.layer == layer) {
        let check = registry
            .get(&def.check)
            .ok_or_else(|| DomainError::UnknownCheckType {
                gate: def.name.clone(),
                check: def.check.clone(),
            })?;

        let dataset = resolver.resolve(&def.dataset).await?;
        let references = resolve_references(def, resolver).await?;
        let ctx = CheckContext {
            dataset: &dataset,
            references: &references,
            reference_time: now,
        };

        let (verdict, message) = check(&ctx, def)?;
        match verdict {
            Verdict::Pass => info!(gate = %def.name, "Gate PASS"),
            _ => warn!(gate = %def.name, verdict = %verdict, %message, "Gate degraded"),
        }
        results.push(GateResult {
            gate: def.name.clone(),
            check: def.check.clone(),
            severity: def.severity,
            verdict,
            message,
            evaluated_at: now,
        });
    }

    Ok(QualityReport {
        run_id: run_id.to_string(),
        layer,
        evaluated_at: now,
        results,
    })
}

async fn resolve_references(
    def: &GateDefinition,
    resolver: &dyn DatasetResolver,
) -> Result<HashMap<String, DatasetSnapshot>, GridloomError> {
    let mut references = HashMap::new();
    if let Some(name) = &def.reference_dataset {
        references.insert(name.clone(), resolver.resolve(name).await?);
    }
    if let Some(fk_columns) = &def.fk_columns {
        for dim in fk_columns.values() {
            if !references.contains_key(dim) {
                references.insert(dim.clone(), resolver.resolve(dim).await?);
            }
        }
    }
    Ok(references)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::quality::Severity;
    use crate::domain::value::Value;
    use anyhow::Result;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn snapshot(name: &str, rows: Vec<Vec<(&str, Value)>>) -> DatasetSnapshot {
        DatasetSnapshot::new(
            name,
            rows.into_iter()
                .map(|pairs| {
                    pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect::<BTreeMap<_, _>>()
                })
                .collect(),
        )
    }

    fn resolver_with_rows(null_row: bool) -> SnapshotResolver {
        let mut rows = vec![vec![("wind_mw", Value::Float(100.0))]; 3];
        if null_row {
            rows.push(vec![("wind_mw", Value::Null)]);
        }
        let mut resolver = SnapshotResolver::default();
        resolver.insert(snapshot("grid_production", rows));
        resolver
    }

    fn gates(yaml: &str) -> Vec<GateDefinition> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_critical_failure_sets_halt_signal() -> Result<()> {
        let defs = gates(
            r#"
- name: no_null_measures
  layer: silver
  dataset: grid_production
  check: null_check
  severity: CRITICAL
  columns: [wind_mw]
"#,
        );
        let report = run_gates(
            &defs,
            Layer::Silver,
            &resolver_with_rows(true),
            &CheckRegistry::default(),
            "run-1",
            now(),
        )
        .await?;

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].verdict, Verdict::Fail);
        assert_eq!(report.results[0].severity, Severity::Critical);
        assert!(report.should_halt());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_check_type_is_fatal() -> Result<()> {
        let defs = gates(
            r#"
- name: exotic
  layer: silver
  dataset: grid_production
  check: entropy_check
  severity: INFO
"#,
        );
        let err = run_gates(
            &defs,
            Layer::Silver,
            &resolver_with_rows(false),
            &CheckRegistry::default(),
            "run-1",
            now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            GridloomError::Domain(DomainError::UnknownCheckType { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_other_layer_gates_are_skipped() -> Result<()> {
        let defs = gates(
            r#"
- name: gold_only
  layer: gold
  dataset: fact_energy_flow
  check: row_count
  severity: WARNING
  expected: 1
"#,
        );
        // Dataset is not resolvable here, but the gate belongs to gold so a
        // silver evaluation never touches it.
        let report = run_gates(
            &defs,
            Layer::Silver,
            &resolver_with_rows(false),
            &CheckRegistry::default(),
            "run-1",
            now(),
        )
        .await?;
        assert!(report.results.is_empty());
        assert_eq!(report.overall(), Verdict::Pass);
        Ok(())
    }

    #[tokio::test]
    async fn test_fk_gate_resolves_reference_dimensions() -> Result<()> {
        let mut resolver = SnapshotResolver::default();
        resolver.insert(snapshot(
            "fact_energy_flow",
            vec![vec![("region_key", Value::Int(7))]],
        ));
        resolver.insert(snapshot(
            "dim_region",
            vec![vec![("region_key", Value::Int(7))]],
        ));

        let defs = gates(
            r#"
- name: facts_reference_regions
  layer: gold
  dataset: fact_energy_flow
  check: fk_exists
  severity: CRITICAL
  fk_columns:
    region_key: dim_region
"#,
        );
        let report = run_gates(
            &defs,
            Layer::Gold,
            &resolver,
            &CheckRegistry::default(),
            "run-1",
            now(),
        )
        .await?;
        assert_eq!(report.results[0].verdict, Verdict::Pass);
        Ok(())
    }
}
