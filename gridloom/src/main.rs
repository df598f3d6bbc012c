// gridloom/src/main.rs

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

// Infrastructure (Config & Adapters)
use gridloom_core::infrastructure::audit::FileAuditSink;
use gridloom_core::infrastructure::config::{ProjectConfig, load_project_config};
use gridloom_core::infrastructure::duckdb::DuckDbWarehouse;

// Domain
use gridloom_core::domain::quality::{CheckRegistry, Layer, QualityReport, Verdict};
use gridloom_core::domain::silver::transform;
use gridloom_core::domain::warehouse::LoadMode;

// Application (Use Cases)
use gridloom_core::application::{SnapshotResolver, run_gates, run_pipeline, sweep_staleness};
use gridloom_core::infrastructure::bronze::BronzeReader;
use gridloom_core::ports::Warehouse;

#[derive(Parser)]
#[command(name = "gridloom")]
#[command(about = "Bronze → Silver → Gold energy-grid warehouse pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 🚀 Runs the pipeline (Bronze -> Silver -> Gold, gated)
    Run {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Process only a specific source family (ex: "grid_production")
        #[arg(long, short)]
        source: Option<String>,

        /// Overwrite facts at an existing grain instead of skipping them
        #[arg(long, default_value = "false")]
        correction: bool,
    },

    /// 🕰️ Runs the dimension staleness sweep only
    Sweep {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// ✅ Evaluates quality gates without committing anything
    Gates {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Gate layer to evaluate: silver | gold
        #[arg(long, default_value = "silver")]
        layer: String,
    },

    /// ⚡ Executes a raw SQL query against the warehouse (Ad-hoc)
    Query {
        query: String,
        #[arg(long, default_value = "target/gridloom/warehouse.duckdb")]
        db_path: String,
    },

    /// 🧹 Cleans run artifacts (target/ folder, including the warehouse)
    Clean {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug gridloom run ... for the full trace
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            project_dir,
            source,
            correction,
        } => {
            println!("⚙️  Loading configuration...");
            let config = load_project_config(&project_dir)?;
            println!("   Project: {}", config.name);

            let warehouse = open_warehouse(&config, &project_dir)?;
            let audit = FileAuditSink::new(&config.target_dir(&project_dir));
            let mode = if correction {
                LoadMode::Correction
            } else {
                LoadMode::Append
            };

            let result =
                run_pipeline(&project_dir, &config, &warehouse, &audit, mode, source).await;
            match result {
                Ok(run) if run.success => {}
                Ok(run) => {
                    eprintln!("\n❌ FAILURE. {} error(s).", run.errors.len());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("\n💥 CRITICAL PIPELINE ERROR: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Sweep { project_dir } => {
            let config = load_project_config(&project_dir)?;
            let warehouse = open_warehouse(&config, &project_dir)?;
            let audit = FileAuditSink::new(&config.target_dir(&project_dir));

            let summary = sweep_staleness(
                chrono::Utc::now(),
                &config.thresholds.lifecycle,
                &warehouse,
                &audit,
            )
            .await?;
            println!(
                "🕰️  Sweep: {} examined, {} → stale, {} → inactive, {} skipped",
                summary.examined, summary.marked_stale, summary.marked_inactive, summary.skipped
            );
        }

        Commands::Gates { project_dir, layer } => {
            let config = load_project_config(&project_dir)?;
            let report = match layer.as_str() {
                "silver" => evaluate_silver_gates(&project_dir, &config).await?,
                "gold" => {
                    let warehouse = open_warehouse(&config, &project_dir)?;
                    warehouse.ensure_schema().await?;
                    run_gates(
                        &config.gates,
                        Layer::Gold,
                        &warehouse,
                        &CheckRegistry::default(),
                        "gates-cli",
                        chrono::Utc::now(),
                    )
                    .await?
                }
                other => {
                    eprintln!("❌ Unknown layer '{}'. Expected: silver | gold", other);
                    std::process::exit(1);
                }
            };

            print_report(&report);
            if report.should_halt() {
                std::process::exit(1);
            }
        }

        Commands::Query { query, db_path } => {
            let warehouse = DuckDbWarehouse::new(&db_path)?;
            match warehouse.query_rows(&query) {
                Ok((columns, rows)) => {
                    println!("{}", columns.join(" | "));
                    for row in rows {
                        println!("{}", row.join(" | "));
                    }
                }
                Err(e) => {
                    eprintln!("❌ Query failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Clean { project_dir } => {
            let config = load_project_config(&project_dir)?;
            let target_dir = config.target_dir(&project_dir);
            if target_dir.exists() {
                std::fs::remove_dir_all(&target_dir)?;
                println!("🧹 Removed {}", target_dir.display());
            }
            let warehouse_file = config.warehouse_file(&project_dir);
            if warehouse_file.exists() {
                std::fs::remove_file(&warehouse_file)?;
                println!("🧹 Removed {}", warehouse_file.display());
            }
            println!("✨ Clean complete");
        }
    }

    Ok(())
}

fn open_warehouse(config: &ProjectConfig, project_dir: &Path) -> anyhow::Result<DuckDbWarehouse> {
    let path = config.warehouse_file(project_dir);
    Ok(DuckDbWarehouse::new(&path.to_string_lossy())?)
}

/// Dry evaluation of the silver gates: transform every source in memory,
/// never write anything.
async fn evaluate_silver_gates(
    project_dir: &Path,
    config: &ProjectConfig,
) -> anyhow::Result<QualityReport> {
    config.validate()?;
    let reader = BronzeReader::new(config.bronze_dir(project_dir));
    let now = chrono::Utc::now();

    let mut resolver = SnapshotResolver::default();
    for source in &config.sources {
        let batch = reader.read_source(&source.name)?;
        let result = transform(&batch, source, now)?;
        resolver.insert(result.to_snapshot());
    }

    let report = run_gates(
        &config.gates,
        Layer::Silver,
        &resolver,
        &CheckRegistry::default(),
        "gates-cli",
        now,
    )
    .await?;
    Ok(report)
}

fn print_report(report: &QualityReport) {
    let (passed, warned, failed) = report.counts();
    for result in &report.results {
        let icon = match result.verdict {
            Verdict::Pass => "✅",
            Verdict::Warn => "⚠️ ",
            Verdict::Fail => "❌",
        };
        println!("{} {} [{}] {}", icon, result.gate, result.check, result.message);
    }
    println!(
        "📋 {} gates: {} passed, {} warned, {} failed (overall {})",
        report.results.len(),
        passed,
        warned,
        failed,
        report.overall()
    );
}
