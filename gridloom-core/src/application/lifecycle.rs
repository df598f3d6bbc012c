// gridloom-core/src/application/lifecycle.rs
//
// Staleness sweep over the region and source dimensions. Forward-only:
// active → stale → inactive, driven by last_seen_at. Rows are never deleted
// and never revived here; revival is the dimension loader's explicit job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::warehouse::{DimensionKind, LifecycleStatus, LifecycleThresholds};
use crate::error::GridloomError;
use crate::ports::audit::{AuditEvent, AuditSink};
use crate::ports::warehouse::Warehouse;

#[derive(Debug, Default, Serialize, Clone)]
pub struct SweepSummary {
    pub examined: usize,
    pub marked_stale: usize,
    pub marked_inactive: usize,
    /// Rows whose status no longer matched when the guarded update ran, or
    /// whose stored status was ahead of the computed target.
    pub skipped: usize,
}

pub async fn sweep_staleness(
    now: DateTime<Utc>,
    thresholds: &LifecycleThresholds,
    store: &dyn Warehouse,
    audit: &dyn AuditSink,
) -> Result<SweepSummary, GridloomError> {
    let mut summary = SweepSummary::default();

    for kind in [DimensionKind::Region, DimensionKind::Source] {
        for recency in store.dimension_recency(kind).await? {
            summary.examined += 1;

            let target = match recency.due_transition(now, thresholds) {
                Ok(Some(target)) => target,
                Ok(None) => continue,
                Err(error) => {
                    // Status ahead of the computed target: someone moved the
                    // row out of band. Skip rather than regress.
                    warn!(dimension = %kind, key = %recency.natural_key, %error, "Sweep skip");
                    summary.skipped += 1;
                    continue;
                }
            };

            let moved = store
                .advance_status(kind, &recency.natural_key, recency.status, target)
                .await?;
            if !moved {
                summary.skipped += 1;
                continue;
            }

            match target {
                LifecycleStatus::Stale => summary.marked_stale += 1,
                LifecycleStatus::Inactive => summary.marked_inactive += 1,
                LifecycleStatus::Active => {}
            }
            info!(
                dimension = %kind,
                key = %recency.natural_key,
                from = %recency.status,
                to = %target,
                "Lifecycle transition"
            );
            audit
                .record(AuditEvent::info(
                    "lifecycle",
                    "status_changed",
                    serde_json::json!({
                        "dimension": kind.as_str(),
                        "key": recency.natural_key,
                        "from": recency.status.as_str(),
                        "to": target.as_str(),
                        "last_seen_at": recency.last_seen_at.to_rfc3339(),
                    }),
                ))
                .await?;
        }
    }

    info!(
        examined = summary.examined,
        stale = summary.marked_stale,
        inactive = summary.marked_inactive,
        skipped = summary.skipped,
        "Staleness sweep complete"
    );
    Ok(summary)
}
