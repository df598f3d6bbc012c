// gridloom-core/src/application/pipeline.rs
//
// The run driver: bronze → transform → silver gates → silver write → gold
// load → sweep → gold gates → checkpoint. Transforms for independent sources
// fan out concurrently; everything that touches the warehouse runs
// sequentially behind the single writer.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::application::dimension_loader::{UpsertSummary, upsert_dimensions};
use crate::application::fact_loader::{LoadSummary, load_facts};
use crate::application::gate_runner::{SnapshotResolver, run_gates};
use crate::application::lifecycle::{SweepSummary, sweep_staleness};
use crate::domain::quality::{CheckRegistry, Layer, QualityReport, Verdict};
use crate::domain::silver::{SourceConfig, TransformResult, transform};
use crate::domain::warehouse::{LoadMode, default_source_catalog};
use crate::error::GridloomError;
use crate::infrastructure::bronze::BronzeReader;
use crate::infrastructure::config::ProjectConfig;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::save_json;
use crate::infrastructure::silver::SilverWriter;
use crate::ports::audit::{AuditEvent, AuditSink};
use crate::ports::dataset::DatasetResolver;
use crate::ports::warehouse::Warehouse;

/// Per-source watermark, advanced only after a fully committed,
/// gate-passing batch.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Checkpoint {
    pub completed_at: DateTime<Utc>,
    pub max_timestamp: Option<DateTime<Utc>>,
    pub rows_out: usize,
}

type CheckpointStore = HashMap<String, Checkpoint>;

#[derive(Debug, Serialize, Clone)]
pub struct SourceOutcome {
    pub source: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub silver_verdict: Option<Verdict>,
    pub halted: bool,
    pub dimensions: Option<UpsertSummary>,
    pub facts: Option<LoadSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct RunResult {
    pub run_id: String,
    pub success: bool,
    pub sources: Vec<SourceOutcome>,
    pub sweep: Option<SweepSummary>,
    pub gold_verdict: Option<Verdict>,
    pub errors: Vec<String>,
}

pub async fn run_pipeline<W>(
    project_dir: &Path,
    config: &ProjectConfig,
    warehouse: &W,
    audit: &dyn AuditSink,
    mode: LoadMode,
    only_source: Option<String>,
) -> Result<RunResult, GridloomError>
where
    W: Warehouse + DatasetResolver,
{
    println!("🚀 Starting Gridloom Pipeline...");
    let start_time = std::time::Instant::now();
    let now = Utc::now();
    let run_id = format!("run-{}", now.format("%Y%m%dT%H%M%SZ"));

    // 1. SETUP (Infra/IO)
    config.validate()?;
    let target_dir = config.target_dir(project_dir);
    if !target_dir.exists() {
        fs::create_dir_all(&target_dir)?;
    }
    let checkpoint_path = target_dir.join("checkpoints.json");
    let mut checkpoints = load_checkpoints(&checkpoint_path)?;

    warehouse.ensure_schema().await?;

    let reader = BronzeReader::new(config.bronze_dir(project_dir));
    let writer = SilverWriter::new(config.silver_dir(project_dir));
    let registry = CheckRegistry::default();
    let catalog = default_source_catalog();

    // 2. SOURCE SELECTION
    let selected: Vec<&SourceConfig> = match &only_source {
        Some(name) => {
            let found: Vec<&SourceConfig> =
                config.sources.iter().filter(|s| &s.name == name).collect();
            if found.is_empty() {
                return Err(InfrastructureError::ConfigError(format!(
                    "unknown source '{name}'"
                ))
                .into());
            }
            found
        }
        None => config.sources.iter().collect(),
    };
    println!("📦 Processing {} source(s)...", selected.len());

    // 3. TRANSFORM PHASE (bounded fan-out, pure CPU + bronze reads)
    let transforms = selected.iter().map(|source| {
        let reader = &reader;
        async move {
            let outcome = reader
                .read_source(&source.name)
                .and_then(|batch| transform(&batch, source, now).map_err(Into::into));
            (*source, outcome)
        }
    });
    let concurrency = config.thresholds.transform_concurrency.max(1);
    let mut transformed: Vec<(&SourceConfig, Result<TransformResult, GridloomError>)> =
        futures::stream::iter(transforms)
            .buffer_unordered(concurrency)
            .collect()
            .await;
    transformed.sort_by(|a, b| a.0.name.cmp(&b.0.name));

    // 4. PER-SOURCE COMMIT LOOP (single writer)
    let mut outcomes = Vec::new();
    let mut errors = Vec::new();

    for (source, result) in transformed {
        let mut outcome = SourceOutcome {
            source: source.name.clone(),
            rows_in: 0,
            rows_out: 0,
            silver_verdict: None,
            halted: false,
            dimensions: None,
            facts: None,
            error: None,
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                eprintln!("    ❌ {}: {}", source.name, e);
                errors.push(format!("{}: {}", source.name, e));
                outcome.error = Some(e.to_string());
                audit
                    .record(AuditEvent::warning(
                        "pipeline",
                        "source_failed",
                        serde_json::json!({"source": source.name, "error": outcome.error}),
                    ))
                    .await?;
                outcomes.push(outcome);
                continue;
            }
        };
        outcome.rows_in = result.rows_in;
        outcome.rows_out = result.rows_out;

        // Silver gates over the in-memory transform output.
        let mut resolver = SnapshotResolver::default();
        resolver.insert(result.to_snapshot());
        let silver_defs: Vec<_> = config
            .gates
            .iter()
            .filter(|g| g.layer == Layer::Silver && g.dataset == source.name)
            .cloned()
            .collect();
        let report = run_gates(&silver_defs, Layer::Silver, &resolver, &registry, &run_id, now)
            .await?;
        save_report(&target_dir, &format!("silver_{}", source.name), &report)?;
        outcome.silver_verdict = Some(report.overall());

        if report.should_halt() {
            let (_, _, failed) = report.counts();
            eprintln!(
                "    ⛔ {}: halted by silver quality gates ({} failed)",
                source.name, failed
            );
            errors.push(format!("{}: CRITICAL silver gate failure", source.name));
            outcome.halted = true;
            audit
                .record(AuditEvent::warning(
                    "pipeline",
                    "silver_halt",
                    serde_json::json!({"source": source.name, "run_id": run_id}),
                ))
                .await?;
            outcomes.push(outcome);
            continue;
        }

        // Commit: silver partitions, then dimensions, then facts.
        writer.write(&result)?;
        let cleaned: Vec<_> = result.cleaned_rows().cloned().collect();
        let dims = upsert_dimensions(&cleaned, source, &catalog, warehouse, now).await?;
        let facts = load_facts(
            &cleaned,
            source,
            &config.capacity,
            mode,
            config.thresholds.orphan_warn_pct,
            warehouse,
            audit,
            now,
        )
        .await?;
        println!(
            "    ✅ {}: {} rows cleaned, {} facts inserted",
            source.name, result.rows_out, facts.inserted
        );
        outcome.dimensions = Some(dims);
        outcome.facts = Some(facts);
        outcomes.push(outcome);

        let max_timestamp = result
            .to_snapshot()
            .max_timestamp(&source.timestamp_column);
        checkpoints.insert(
            source.name.clone(),
            Checkpoint {
                completed_at: now,
                max_timestamp,
                rows_out: result.rows_out,
            },
        );
    }

    // 5. LIFECYCLE SWEEP
    let sweep = sweep_staleness(now, &config.thresholds.lifecycle, warehouse, audit).await?;

    // 6. GOLD GATES over the warehouse itself.
    let gold_report = run_gates(
        &config.gates,
        Layer::Gold,
        warehouse,
        &registry,
        &run_id,
        now,
    )
    .await?;
    save_report(&target_dir, "gold", &gold_report)?;
    let gold_halt = gold_report.should_halt();
    if gold_halt {
        eprintln!("    ⛔ Gold quality gates failed; checkpoints not advanced");
        errors.push("CRITICAL gold gate failure".to_string());
        audit
            .record(AuditEvent::warning(
                "pipeline",
                "gold_halt",
                serde_json::json!({"run_id": run_id}),
            ))
            .await?;
    } else {
        // 7. Watermarks advance only once the whole run is committed and
        // gate-passing.
        save_json(&checkpoint_path, &checkpoints)?;
    }

    let result = RunResult {
        run_id: run_id.clone(),
        success: errors.is_empty(),
        sources: outcomes,
        sweep: Some(sweep),
        gold_verdict: Some(gold_report.overall()),
        errors,
    };
    save_json(&target_dir.join("run_results.json"), &result)?;

    audit
        .record(AuditEvent::info(
            "pipeline",
            "run_complete",
            serde_json::json!({"run_id": run_id, "success": result.success}),
        ))
        .await?;
    println!(
        "✨ Done in {:.2}s ({}).",
        start_time.elapsed().as_secs_f64(),
        if result.success { "success" } else { "with errors" }
    );
    Ok(result)
}

fn save_report(
    target_dir: &Path,
    name: &str,
    report: &QualityReport,
) -> Result<(), GridloomError> {
    let path = target_dir.join("quality").join(format!("{name}.json"));
    save_json(&path, report)?;
    Ok(())
}

fn load_checkpoints(path: &Path) -> Result<CheckpointStore, GridloomError> {
    if !path.exists() {
        return Ok(CheckpointStore::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}
