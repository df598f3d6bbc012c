// gridloom-core/src/domain/quality/checks.rs
//
// The built-in check vocabulary. Each check is a pure function over a
// dataset snapshot: no storage access, no side effects, so every one is
// testable in isolation and safe to run from any dispatch context.

use crate::domain::error::DomainError;
use crate::domain::quality::gate::{GateDefinition, Verdict};
use crate::domain::quality::registry::CheckContext;

const DEFAULT_TOLERANCE_PCT: f64 = 5.0;
const DEFAULT_MAX_AGE_HOURS: i64 = 24;

fn incomplete(def: &GateDefinition, missing: &str) -> DomainError {
    DomainError::IncompleteGate {
        gate: def.name.clone(),
        missing: missing.to_string(),
    }
}

/// Compare the observed row count against an expected count or a reference
/// dataset's count. Within tolerance → PASS, within twice the tolerance →
/// WARN, beyond → FAIL.
pub fn row_count(
    ctx: &CheckContext<'_>,
    def: &GateDefinition,
) -> Result<(Verdict, String), DomainError> {
    let actual = ctx.dataset.len() as u64;
    let expected = match (def.expected, &def.reference_dataset) {
        (Some(expected), _) => expected,
        (None, Some(reference)) => ctx.reference(reference)?.len() as u64,
        (None, None) => return Err(incomplete(def, "expected or reference_dataset")),
    };
    let tolerance = def.tolerance_pct.unwrap_or(DEFAULT_TOLERANCE_PCT);

    if expected == 0 {
        let verdict = if actual == 0 { Verdict::Pass } else { Verdict::Warn };
        return Ok((
            verdict,
            format!("expected 0 rows, observed {actual}"),
        ));
    }

    let diff_pct = (actual.abs_diff(expected)) as f64 / expected as f64 * 100.0;
    let verdict = if diff_pct <= tolerance {
        Verdict::Pass
    } else if diff_pct <= tolerance * 2.0 {
        Verdict::Warn
    } else {
        Verdict::Fail
    };
    Ok((
        verdict,
        format!(
            "observed {actual} rows vs expected {expected} ({diff_pct:.1}% off, tolerance {tolerance:.1}%)"
        ),
    ))
}

/// Fail if any of the named columns contains a null (a missing column counts
/// as all-null).
pub fn null_check(
    ctx: &CheckContext<'_>,
    def: &GateDefinition,
) -> Result<(Verdict, String), DomainError> {
    let columns = def
        .columns
        .as_ref()
        .ok_or_else(|| incomplete(def, "columns"))?;

    let mut offending = Vec::new();
    for column in columns {
        if !ctx.dataset.has_column(column) {
            offending.push(format!("{column} (missing)"));
            continue;
        }
        let nulls = ctx.dataset.null_count(column);
        if nulls > 0 {
            offending.push(format!("{column} ({nulls} nulls)"));
        }
    }

    if offending.is_empty() {
        Ok((
            Verdict::Pass,
            format!("no nulls in {}", columns.join(", ")),
        ))
    } else {
        Ok((Verdict::Fail, format!("nulls found: {}", offending.join(", "))))
    }
}

/// Fail if any value of the named numeric column falls outside [min, max].
pub fn range_check(
    ctx: &CheckContext<'_>,
    def: &GateDefinition,
) -> Result<(Verdict, String), DomainError> {
    let column = def.column.as_ref().ok_or_else(|| incomplete(def, "column"))?;
    let min = def.min.ok_or_else(|| incomplete(def, "min"))?;
    let max = def.max.ok_or_else(|| incomplete(def, "max"))?;

    if !ctx.dataset.has_column(column) {
        return Ok((
            Verdict::Fail,
            format!("column '{column}' not found in dataset '{}'", ctx.dataset.name),
        ));
    }

    let values = ctx.dataset.numeric_values(column);
    let out_of_range = values.iter().filter(|v| **v < min || **v > max).count();

    if out_of_range == 0 {
        Ok((
            Verdict::Pass,
            format!("{} values within [{min}, {max}]", values.len()),
        ))
    } else {
        Ok((
            Verdict::Fail,
            format!(
                "{out_of_range} of {} values outside [{min}, {max}] in '{column}'",
                values.len()
            ),
        ))
    }
}

/// Verify the dataset's latest timestamp is recent enough. Within the window
/// → PASS, within twice the window → WARN, older → FAIL.
pub fn freshness_check(
    ctx: &CheckContext<'_>,
    def: &GateDefinition,
) -> Result<(Verdict, String), DomainError> {
    let column = def
        .time_column
        .as_ref()
        .ok_or_else(|| incomplete(def, "time_column"))?;
    let max_age_hours = def.max_age_hours.unwrap_or(DEFAULT_MAX_AGE_HOURS);

    let Some(latest) = ctx.dataset.max_timestamp(column) else {
        return Ok((
            Verdict::Fail,
            format!("no timestamps found in column '{column}'"),
        ));
    };

    let age = ctx.reference_time.signed_duration_since(latest);
    let age_hours = age.num_minutes() as f64 / 60.0;

    let verdict = if age_hours <= max_age_hours as f64 {
        Verdict::Pass
    } else if age_hours <= (max_age_hours * 2) as f64 {
        Verdict::Warn
    } else {
        Verdict::Fail
    };
    Ok((
        verdict,
        format!("latest timestamp {latest} is {age_hours:.1}h old (window {max_age_hours}h)"),
    ))
}

/// Verify every FK value in the fact dataset exists in the referenced
/// dimension snapshot. Gold-layer only.
pub fn fk_exists(
    ctx: &CheckContext<'_>,
    def: &GateDefinition,
) -> Result<(Verdict, String), DomainError> {
    let fk_columns = def
        .fk_columns
        .as_ref()
        .ok_or_else(|| incomplete(def, "fk_columns"))?;

    let mut orphaned = Vec::new();
    for (fk_column, dim_dataset) in fk_columns {
        let dim = ctx.reference(dim_dataset)?;
        let valid = dim.distinct_values(fk_column);
        let observed = ctx.dataset.distinct_values(fk_column);
        let orphans = observed.difference(&valid).count();
        if orphans > 0 {
            orphaned.push(format!("{fk_column} ({orphans} orphan keys vs {dim_dataset})"));
        }
    }

    if orphaned.is_empty() {
        Ok((Verdict::Pass, "all foreign keys resolve".into()))
    } else {
        Ok((Verdict::Fail, format!("orphaned: {}", orphaned.join(", "))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::snapshot::DatasetSnapshot;
    use crate::domain::value::Value;
    use chrono::{TimeZone, Utc};
    use std::collections::{BTreeMap, HashMap};

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

    fn gate(check: &str) -> GateDefinition {
        serde_yaml::from_str(&format!(
            "{{ name: g, dataset: d, check: {check}, severity: INFO }}"
        ))
        .unwrap()
    }

    fn ctx<'a>(
        dataset: &'a DatasetSnapshot,
        references: &'a HashMap<String, DatasetSnapshot>,
    ) -> CheckContext<'a> {
        CheckContext {
            dataset,
            references,
            reference_time: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_row_count_against_reference() {
        let dataset = snapshot("silver", vec![vec![("a", Value::Int(1))]; 96]);
        let mut refs = HashMap::new();
        refs.insert(
            "bronze".to_string(),
            snapshot("bronze", vec![vec![("a", Value::Int(1))]; 100]),
        );
        let mut def = gate("row_count");
        def.reference_dataset = Some("bronze".into());

        let dataset_ref = &dataset;
        let (verdict, _) = row_count(&ctx(dataset_ref, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Pass); // 4% off, within ±5%
    }

    #[test]
    fn test_row_count_warn_then_fail() {
        let refs = HashMap::new();
        let mut def = gate("row_count");
        def.expected = Some(100);

        let dataset = snapshot("s", vec![vec![("a", Value::Int(1))]; 92]);
        let (verdict, _) = row_count(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Warn); // 8% off, within 2x tolerance

        let dataset = snapshot("s", vec![vec![("a", Value::Int(1))]; 50]);
        let (verdict, _) = row_count(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Fail);
    }

    #[test]
    fn test_row_count_missing_criteria() {
        let refs = HashMap::new();
        let dataset = snapshot("s", vec![]);
        let err = row_count(&ctx(&dataset, &refs), &gate("row_count")).unwrap_err();
        assert!(matches!(err, DomainError::IncompleteGate { .. }));
    }

    #[test]
    fn test_null_check_one_null_fails() {
        let mut rows = vec![vec![("mw", Value::Float(1.0))]; 99];
        rows.push(vec![("mw", Value::Null)]);
        let dataset = snapshot("s", rows);
        let refs = HashMap::new();
        let mut def = gate("null_check");
        def.columns = Some(vec!["mw".into()]);

        let (verdict, message) = null_check(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Fail);
        assert!(message.contains("1 nulls"));
    }

    #[test]
    fn test_range_check_bounds() {
        let dataset = snapshot(
            "s",
            vec![
                vec![("mw", Value::Float(500.0))],
                vec![("mw", Value::Float(120_000.0))],
            ],
        );
        let refs = HashMap::new();
        let mut def = gate("range_check");
        def.column = Some("mw".into());
        def.min = Some(0.0);
        def.max = Some(100_000.0);

        let (verdict, message) = range_check(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Fail);
        assert!(message.contains("1 of 2"));
    }

    #[test]
    fn test_freshness_ladder() {
        let refs = HashMap::new();
        let mut def = gate("freshness_check");
        def.time_column = Some("measured_at".into());
        def.max_age_hours = Some(24);

        // 12h old → PASS
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let dataset = snapshot("s", vec![vec![("measured_at", Value::Timestamp(ts))]]);
        let (verdict, _) = freshness_check(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Pass);

        // 36h old → WARN
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap();
        let dataset = snapshot("s", vec![vec![("measured_at", Value::Timestamp(ts))]]);
        let (verdict, _) = freshness_check(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Warn);

        // 60h old → FAIL
        let ts = Utc.with_ymd_and_hms(2024, 12, 30, 12, 0, 0).unwrap();
        let dataset = snapshot("s", vec![vec![("measured_at", Value::Timestamp(ts))]]);
        let (verdict, _) = freshness_check(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Fail);
    }

    #[test]
    fn test_fk_exists_detects_orphans() {
        let dataset = snapshot(
            "fact_energy_flow",
            vec![
                vec![("region_key", Value::Int(1))],
                vec![("region_key", Value::Int(99))],
            ],
        );
        let mut refs = HashMap::new();
        refs.insert(
            "dim_region".to_string(),
            snapshot("dim_region", vec![vec![("region_key", Value::Int(1))]]),
        );
        let mut def = gate("fk_exists");
        def.fk_columns = Some(
            [("region_key".to_string(), "dim_region".to_string())]
                .into_iter()
                .collect(),
        );

        let (verdict, message) = fk_exists(&ctx(&dataset, &refs), &def).unwrap();
        assert_eq!(verdict, Verdict::Fail);
        assert!(message.contains("region_key"));
    }
}
