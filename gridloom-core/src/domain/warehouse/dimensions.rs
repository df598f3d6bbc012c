// gridloom-core/src/domain/warehouse/dimensions.rs
//
// Dimension-side domain types: lifecycle status for slowly-arriving assets,
// natural-key candidates extracted from cleaned records, and the calendar
// decomposition behind the time dimension.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::DomainError;

/// Lifecycle of a dimension member, driven by how recently the feeds last
/// mentioned it. Transitions only move forward (active → stale → inactive);
/// revival back to active happens in the dimension loader when a fresh
/// observation arrives, never in the staleness sweep.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Stale,
    Inactive,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Stale => "stale",
            LifecycleStatus::Inactive => "inactive",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LifecycleStatus::Active => 0,
            LifecycleStatus::Stale => 1,
            LifecycleStatus::Inactive => 2,
        }
    }

    /// Forward-only ordering check. Staying put is allowed; moving backward
    /// is not.
    pub fn can_transition_to(&self, target: LifecycleStatus) -> bool {
        target.rank() >= self.rank()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LifecycleStatus::Active),
            "stale" => Some(LifecycleStatus::Stale),
            "inactive" => Some(LifecycleStatus::Inactive),
            _ => None,
        }
    }

    /// The status a member with the given silence ought to hold. Boundaries
    /// are exclusive: an asset silent for exactly the staleness window is
    /// still active.
    pub fn target_for(elapsed: Duration, thresholds: &LifecycleThresholds) -> Self {
        if elapsed > Duration::hours(thresholds.inactive_hours) {
            LifecycleStatus::Inactive
        } else if elapsed > Duration::hours(thresholds.staleness_hours) {
            LifecycleStatus::Stale
        } else {
            LifecycleStatus::Active
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How long a dimension member may go unmentioned before it is demoted.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct LifecycleThresholds {
    #[serde(default = "LifecycleThresholds::default_staleness_hours")]
    pub staleness_hours: i64,
    #[serde(default = "LifecycleThresholds::default_inactive_hours")]
    pub inactive_hours: i64,
}

impl LifecycleThresholds {
    fn default_staleness_hours() -> i64 {
        24
    }

    fn default_inactive_hours() -> i64 {
        168
    }
}

impl Default for LifecycleThresholds {
    fn default() -> Self {
        Self {
            staleness_hours: Self::default_staleness_hours(),
            inactive_hours: Self::default_inactive_hours(),
        }
    }
}

/// Which dimension a lifecycle operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    Region,
    Source,
}

impl DimensionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Region => "region",
            DimensionKind::Source => "source",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Natural key plus recency, as read back from the warehouse during the
/// staleness sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRecency {
    pub natural_key: String,
    pub last_seen_at: DateTime<Utc>,
    pub status: LifecycleStatus,
}

impl DimensionRecency {
    /// The transition this member needs, if any. Returns an error when the
    /// warehouse somehow holds a status ahead of the computed target, which
    /// would mean someone moved it backward out of band.
    pub fn due_transition(
        &self,
        now: DateTime<Utc>,
        thresholds: &LifecycleThresholds,
    ) -> Result<Option<LifecycleStatus>, DomainError> {
        let elapsed = now.signed_duration_since(self.last_seen_at);
        let target = LifecycleStatus::target_for(elapsed, thresholds);
        if target == self.status {
            return Ok(None);
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::LifecycleViolation {
                key: self.natural_key.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(Some(target))
    }
}

/// A region observed in a cleaned batch, keyed by its code.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCandidate {
    pub code: String,
    pub name: Option<String>,
    pub population: Option<i64>,
    pub area_km2: Option<f64>,
}

impl RegionCandidate {
    /// A candidate without a usable code cannot be keyed and is skipped by
    /// the loader (counted, never fatal).
    pub fn is_malformed(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// An energy source from the static catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCandidate {
    pub name: String,
    pub renewable: bool,
    pub category: String,
}

/// The well-known production sources. The catalog is seeded on every run so
/// fact rows always find their source keys even before any feed mentions
/// them.
pub fn default_source_catalog() -> Vec<SourceCandidate> {
    fn source(name: &str, renewable: bool, category: &str) -> SourceCandidate {
        SourceCandidate {
            name: name.to_string(),
            renewable,
            category: category.to_string(),
        }
    }
    vec![
        source("wind", true, "renewable"),
        source("solar", true, "renewable"),
        source("hydro", true, "renewable"),
        source("bioenergy", true, "renewable"),
        source("nuclear", false, "low_carbon"),
        source("gas", false, "fossil"),
        source("coal", false, "fossil"),
        source("oil", false, "fossil"),
    ]
}

/// Calendar decomposition of one measurement instant, the natural key of the
/// time dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub instant: DateTime<Utc>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// ISO weekday, Monday = 1 through Sunday = 7.
    pub weekday: u32,
    pub is_weekend: bool,
}

impl TimeSlot {
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        let weekday = instant.weekday().number_from_monday();
        Self {
            instant,
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
            hour: instant.hour(),
            minute: instant.minute(),
            weekday,
            is_weekend: weekday >= 6,
        }
    }
}
