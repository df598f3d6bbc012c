// gridloom-core/src/application/dimension_loader.rs
//
// Dimension population: extract region / time-slot / source candidates from
// cleaned records, then upsert each through the Warehouse port. All upserts
// are idempotent on the natural key; running the loader twice on identical
// input changes nothing but last_seen_at.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::domain::record::CleanedRecord;
use crate::domain::silver::SourceConfig;
use crate::domain::value::format_timestamp;
use crate::domain::warehouse::{RegionCandidate, SourceCandidate, TimeSlot};
use crate::error::GridloomError;
use crate::ports::warehouse::{UpsertOutcome, Warehouse};

#[derive(Debug, Default, Serialize, Clone)]
pub struct UpsertSummary {
    pub regions_inserted: usize,
    pub regions_refreshed: usize,
    pub time_slots_inserted: usize,
    pub time_slots_refreshed: usize,
    pub sources_inserted: usize,
    pub sources_refreshed: usize,
    /// Candidates skipped for an unusable natural key. Never batch-fatal.
    pub malformed_skipped: usize,
}

pub async fn upsert_dimensions(
    records: &[CleanedRecord],
    config: &SourceConfig,
    catalog: &[SourceCandidate],
    store: &dyn Warehouse,
    now: DateTime<Utc>,
) -> Result<UpsertSummary, GridloomError> {
    let mut summary = UpsertSummary::default();

    // Regions, deduplicated on code. The last record's descriptive
    // attributes win within the batch; the warehouse merges with COALESCE
    // anyway so ordering only affects which non-null name lands first.
    let mut regions: BTreeMap<String, RegionCandidate> = BTreeMap::new();
    if let Some(code_column) = &config.region_code_column {
        for record in records {
            let Some(code) = record.text(code_column) else {
                continue;
            };
            let candidate = RegionCandidate {
                code: code.to_string(),
                name: config
                    .region_name_column
                    .as_ref()
                    .and_then(|c| record.text(c))
                    .map(str::to_string),
                population: None,
                area_km2: None,
            };
            if candidate.is_malformed() {
                summary.malformed_skipped += 1;
                continue;
            }
            regions.insert(candidate.code.clone(), candidate);
        }
    }
    for candidate in regions.values() {
        match store.upsert_region(candidate, now).await? {
            UpsertOutcome::Inserted => summary.regions_inserted += 1,
            UpsertOutcome::Refreshed => summary.regions_refreshed += 1,
        }
    }

    // Time slots, deduplicated on the canonical rendering of the instant.
    let mut seen_instants = BTreeSet::new();
    for record in records {
        let Some(ts) = record.timestamp(&config.timestamp_column) else {
            continue;
        };
        if !seen_instants.insert(format_timestamp(ts)) {
            continue;
        }
        match store.upsert_time_slot(&TimeSlot::from_instant(ts)).await? {
            UpsertOutcome::Inserted => summary.time_slots_inserted += 1,
            UpsertOutcome::Refreshed => summary.time_slots_refreshed += 1,
        }
    }

    // Sources: the static catalog plus anything the measure map names that
    // the catalog does not know yet.
    let mut sources: BTreeMap<String, SourceCandidate> = catalog
        .iter()
        .map(|s| (s.name.clone(), s.clone()))
        .collect();
    for source_name in config.measures.values() {
        if source_name.trim().is_empty() {
            summary.malformed_skipped += 1;
            warn!(source = %config.name, "Measure maps to an empty source name");
            continue;
        }
        sources.entry(source_name.clone()).or_insert_with(|| SourceCandidate {
            name: source_name.clone(),
            renewable: false,
            category: "uncatalogued".to_string(),
        });
    }
    for candidate in sources.values() {
        match store.upsert_source(candidate, now).await? {
            UpsertOutcome::Inserted => summary.sources_inserted += 1,
            UpsertOutcome::Refreshed => summary.sources_refreshed += 1,
        }
    }

    info!(
        source = %config.name,
        regions = summary.regions_inserted + summary.regions_refreshed,
        time_slots = summary.time_slots_inserted + summary.time_slots_refreshed,
        sources = summary.sources_inserted + summary.sources_refreshed,
        malformed = summary.malformed_skipped,
        "Dimensions upserted"
    );
    Ok(summary)
}
