// gridloom-core/src/domain/warehouse/facts.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the fact loader treats a measurement that already exists in the
/// warehouse for the same (time, region, source) grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Skip rows whose grain already exists. Re-running a batch is a no-op.
    #[default]
    Append,
    /// Overwrite existing rows at the same grain. For restated feeds only.
    Correction,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Append => "append",
            LoadMode::Correction => "correction",
        }
    }
}

/// One fully-resolved fact row, ready for the warehouse. All dimension
/// references are surrogate keys; rows that failed key resolution never get
/// this far.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub time_key: i64,
    pub region_key: i64,
    pub source_key: i64,
    pub measured_mw: f64,
    /// measured_mw / installed capacity, rounded to 4 decimal places. None
    /// when no capacity reference exists for the (region, source) pair.
    pub load_factor: Option<f64>,
    pub temperature_c: Option<f64>,
    pub price_mwh: Option<f64>,
    pub batch_id: String,
    pub loaded_at: DateTime<Utc>,
}

/// Installed capacity in MW per (region, source) pair, loaded from the
/// project's capacity fragment.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CapacityReference {
    /// "region_code|source_name" → installed capacity in MW.
    #[serde(default)]
    capacities_mw: BTreeMap<String, f64>,
}

impl CapacityReference {
    pub fn new(capacities_mw: BTreeMap<String, f64>) -> Self {
        Self { capacities_mw }
    }

    pub fn is_empty(&self) -> bool {
        self.capacities_mw.is_empty()
    }

    pub fn capacity_mw(&self, region_code: &str, source_name: &str) -> Option<f64> {
        self.capacities_mw
            .get(&format!("{region_code}|{source_name}"))
            .copied()
    }

    /// Load factor for a measurement, rounded to 4 decimal places. Zero or
    /// negative capacity yields None rather than a nonsense ratio.
    pub fn load_factor(&self, region_code: &str, source_name: &str, measured_mw: f64) -> Option<f64> {
        let capacity = self.capacity_mw(region_code, source_name)?;
        if capacity <= 0.0 {
            return None;
        }
        Some((measured_mw / capacity * 10_000.0).round() / 10_000.0)
    }
}
