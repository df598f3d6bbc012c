// gridloom-core/src/domain/quality/gate.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How much a failing gate matters to the pipeline.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Outcome of a single check evaluation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[default]
    Silver,
    Gold,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Silver => write!(f, "silver"),
            Layer::Gold => write!(f, "gold"),
        }
    }
}

/// One declarative quality gate, loaded from YAML.
///
/// The criteria fields are check-specific; unused ones stay `None`. The
/// runner dispatches on `check` through the registry, so new check types are
/// additive registrations, never new fields in control flow.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GateDefinition {
    pub name: String,

    #[serde(default)]
    pub layer: Layer,

    /// Target dataset name, resolved through the DatasetResolver port.
    pub dataset: String,

    pub check: String,
    pub severity: Severity,

    // --- Criteria ---
    pub columns: Option<Vec<String>>,
    pub column: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub expected: Option<u64>,
    pub reference_dataset: Option<String>,
    pub tolerance_pct: Option<f64>,
    pub time_column: Option<String>,
    pub max_age_hours: Option<i64>,

    /// FK column → dimension dataset holding the valid key values.
    pub fk_columns: Option<BTreeMap<String, String>>,
}

/// One evaluated gate.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GateResult {
    pub gate: String,
    pub check: String,
    pub severity: Severity,
    pub verdict: Verdict,
    pub message: String,
    pub evaluated_at: DateTime<Utc>,
}

/// All gate results for one pipeline run: a persisted audit artifact and the
/// halt signal checked by the pipeline driver.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QualityReport {
    pub run_id: String,
    pub layer: Layer,
    pub evaluated_at: DateTime<Utc>,
    pub results: Vec<GateResult>,
}

impl QualityReport {
    /// Aggregate verdict: any CRITICAL failure makes the whole report FAIL;
    /// lesser failures or warnings degrade it to WARN only.
    pub fn overall(&self) -> Verdict {
        if self.should_halt() {
            return Verdict::Fail;
        }
        if self
            .results
            .iter()
            .any(|r| r.verdict != Verdict::Pass)
        {
            return Verdict::Warn;
        }
        Verdict::Pass
    }

    /// True when a CRITICAL gate failed. The report never halts anything
    /// itself; the pipeline driver must check this before the next stage.
    pub fn should_halt(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.verdict == Verdict::Fail && r.severity == Severity::Critical)
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let passed = self.results.iter().filter(|r| r.verdict == Verdict::Pass).count();
        let warned = self.results.iter().filter(|r| r.verdict == Verdict::Warn).count();
        let failed = self.results.iter().filter(|r| r.verdict == Verdict::Fail).count();
        (passed, warned, failed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn result(severity: Severity, verdict: Verdict) -> GateResult {
        GateResult {
            gate: "g".into(),
            check: "null_check".into(),
            severity,
            verdict,
            message: String::new(),
            evaluated_at: Utc::now(),
        }
    }

    fn report(results: Vec<GateResult>) -> QualityReport {
        QualityReport {
            run_id: "run-1".into(),
            layer: Layer::Silver,
            evaluated_at: Utc::now(),
            results,
        }
    }

    #[test]
    fn test_critical_failure_halts() {
        let rep = report(vec![
            result(Severity::Info, Verdict::Pass),
            result(Severity::Critical, Verdict::Fail),
        ]);
        assert!(rep.should_halt());
        assert_eq!(rep.overall(), Verdict::Fail);
    }

    #[test]
    fn test_warning_failures_do_not_halt() {
        let rep = report(vec![
            result(Severity::Warning, Verdict::Fail),
            result(Severity::Info, Verdict::Warn),
        ]);
        assert!(!rep.should_halt());
        assert_eq!(rep.overall(), Verdict::Warn);
    }

    #[test]
    fn test_all_pass() {
        let rep = report(vec![result(Severity::Critical, Verdict::Pass)]);
        assert_eq!(rep.overall(), Verdict::Pass);
        assert_eq!(rep.counts(), (1, 0, 0));
    }

    #[test]
    fn test_gate_definition_yaml() {
        let yaml = r#"
name: mw_within_bounds
layer: silver
dataset: grid_production
check: range_check
severity: CRITICAL
column: wind_mw
min: 0
max: 100000
"#;
        let def: GateDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.check, "range_check");
        assert_eq!(def.severity, Severity::Critical);
        assert_eq!(def.min, Some(0.0));
        assert!(def.columns.is_none());
    }
}
