use anyhow::Result;
use assert_cmd::prelude::*;
use duckdb::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Scaffolded gridloom project in a temp dir: manifest, bronze batches and
/// optional quality gates, built programmatically per test.
struct GridloomTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

const MANIFEST: &str = r#"
name: grid_demo
sources:
  - name: grid_production
    rename:
      date_heure: measured_at
      code_insee_region: region_code
      libelle_region: region_name
      eolien: wind_mw
      solaire: solar_mw
    columns:
      - { name: measured_at, type: timestamp, required: true }
      - { name: region_code, type: text, required: true }
      - { name: region_name, type: text }
      - { name: wind_mw, type: float }
      - { name: solar_mw, type: float }
    dedup_keys: [region_code, measured_at]
    timestamp_column: measured_at
    region_code_column: region_code
    region_name_column: region_name
    measures:
      wind_mw: wind
      solar_mw: solar
"#;

const BRONZE_BATCH: &str = r#"{"records": [
    {"date_heure": "2025-01-01T10:00:00Z", "code_insee_region": "11",
     "libelle_region": "Ile-de-France", "eolien": 250.0, "solaire": 40.0,
     "observed_at": "2025-01-01T10:05:00Z"},
    {"date_heure": "2025-01-01T10:00:00Z", "code_insee_region": "11",
     "libelle_region": "Ile-de-France", "eolien": 255.0, "solaire": 41.0,
     "observed_at": "2025-01-01T10:20:00Z"},
    {"date_heure": "2025-01-01T10:15:00Z", "code_insee_region": "53",
     "libelle_region": "Bretagne", "eolien": 800.0, "solaire": null,
     "observed_at": "2025-01-01T10:20:00Z"}
]}"#;

impl GridloomTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();

        fs::write(root.join("gridloom_project.yaml"), MANIFEST)?;
        let bronze = root.join("bronze");
        fs::create_dir_all(&bronze)?;
        fs::write(bronze.join("grid_production.json"), BRONZE_BATCH)?;

        Ok(Self { _tmp: tmp, root })
    }

    fn with_gates(self, gates_yaml: &str) -> Result<Self> {
        let config_dir = self.root.join("config");
        fs::create_dir_all(&config_dir)?;
        fs::write(config_dir.join("quality_gates.yml"), gates_yaml)?;
        Ok(self)
    }

    fn gridloom(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gridloom"));
        cmd.current_dir(&self.root);
        cmd
    }

    fn warehouse_path(&self) -> PathBuf {
        self.root.join("target/gridloom/warehouse.duckdb")
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let conn = Connection::open(self.warehouse_path())?;
        let count = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

fn silver_partition(root: &Path) -> PathBuf {
    root.join("target/gridloom/silver/grid_production/date=2025-01-01/part.ndjson")
}

#[test]
fn test_run_builds_star_schema() -> Result<()> {
    let env = GridloomTestEnv::new()?;

    env.gridloom().arg("run").assert().success();

    // Dedup: 3 raw rows -> 2 cleaned (latest observation wins for 10:00/11)
    let silver = fs::read_to_string(silver_partition(&env.root))?;
    assert_eq!(silver.lines().count(), 2);
    assert!(silver.contains("255"), "latest observation must win: {silver}");
    assert!(!silver.contains("250.0"), "stale duplicate must be gone");

    // Dimensions: 2 regions, 2 time slots, full source catalog.
    assert_eq!(env.count("SELECT count(*) FROM dim_region")?, 2);
    assert_eq!(env.count("SELECT count(*) FROM dim_time")?, 2);
    assert_eq!(
        env.count("SELECT count(*) FROM dim_source WHERE status = 'active'")?,
        8
    );

    // Facts: wind for both regions, solar only where non-null.
    assert_eq!(env.count("SELECT count(*) FROM fact_energy_flow")?, 3);
    assert_eq!(
        env.count(
            "SELECT count(*) FROM fact_energy_flow f
             JOIN dim_region r USING (region_key)
             WHERE r.region_code = '53'"
        )?,
        1
    );

    assert!(env.root.join("target/gridloom/checkpoints.json").exists());
    assert!(env.root.join("target/gridloom/run_results.json").exists());
    assert!(env.root.join("target/gridloom/audit.log").exists());
    Ok(())
}

#[test]
fn test_rerun_is_idempotent() -> Result<()> {
    let env = GridloomTestEnv::new()?;

    env.gridloom().arg("run").assert().success();
    let facts_before = env.count("SELECT count(*) FROM fact_energy_flow")?;
    let keys_before = env.count("SELECT max(region_key) FROM dim_region")?;

    env.gridloom().arg("run").assert().success();
    assert_eq!(
        env.count("SELECT count(*) FROM fact_energy_flow")?,
        facts_before,
        "rerun must not duplicate facts"
    );
    assert_eq!(
        env.count("SELECT max(region_key) FROM dim_region")?,
        keys_before,
        "surrogate keys must survive a rerun"
    );
    Ok(())
}

#[test]
fn test_critical_gate_halts_run() -> Result<()> {
    let env = GridloomTestEnv::new()?.with_gates(
        r#"
gates:
  - name: implausible_mw
    layer: silver
    dataset: grid_production
    check: range_check
    severity: CRITICAL
    column: wind_mw
    min: 0
    max: 100
"#,
    )?;

    env.gridloom().arg("run").assert().failure();

    // The halted source must not commit anything downstream.
    assert!(!silver_partition(&env.root).exists());
    assert_eq!(env.count("SELECT count(*) FROM fact_energy_flow")?, 0);
    Ok(())
}

#[test]
fn test_warning_gate_does_not_halt() -> Result<()> {
    let env = GridloomTestEnv::new()?.with_gates(
        r#"
gates:
  - name: implausible_mw
    layer: silver
    dataset: grid_production
    check: range_check
    severity: WARNING
    column: wind_mw
    min: 0
    max: 100
"#,
    )?;

    env.gridloom().arg("run").assert().success();
    assert_eq!(env.count("SELECT count(*) FROM fact_energy_flow")?, 3);
    Ok(())
}

#[test]
fn test_correction_mode_overwrites() -> Result<()> {
    let env = GridloomTestEnv::new()?;
    env.gridloom().arg("run").assert().success();

    // Restate the Bretagne reading.
    fs::write(
        env.root.join("bronze/grid_production.json"),
        r#"{"records": [
            {"date_heure": "2025-01-01T10:15:00Z", "code_insee_region": "53",
             "libelle_region": "Bretagne", "eolien": 900.0,
             "observed_at": "2025-01-02T09:00:00Z"}
        ]}"#,
    )?;

    // Append mode skips the existing grain.
    env.gridloom().arg("run").assert().success();
    assert_eq!(
        env.count(
            "SELECT count(*) FROM fact_energy_flow WHERE measured_mw = 900.0"
        )?,
        0
    );

    // Correction mode overwrites it.
    env.gridloom().arg("run").arg("--correction").assert().success();
    assert_eq!(
        env.count(
            "SELECT count(*) FROM fact_energy_flow WHERE measured_mw = 900.0"
        )?,
        1
    );
    Ok(())
}

#[test]
fn test_query_command_reads_warehouse() -> Result<()> {
    let env = GridloomTestEnv::new()?;
    env.gridloom().arg("run").assert().success();

    env.gridloom()
        .arg("query")
        .arg("SELECT region_code FROM dim_region ORDER BY region_code")
        .assert()
        .success()
        .stdout(predicates::str::contains("11"))
        .stdout(predicates::str::contains("53"));
    Ok(())
}

#[test]
fn test_gates_command_gold_layer() -> Result<()> {
    let env = GridloomTestEnv::new()?.with_gates(
        r#"
gates:
  - name: facts_reference_regions
    layer: gold
    dataset: fact_energy_flow
    check: fk_exists
    severity: CRITICAL
    fk_columns:
      region_key: dim_region
"#,
    )?;
    env.gridloom().arg("run").assert().success();

    env.gridloom()
        .arg("gates")
        .arg("--layer")
        .arg("gold")
        .assert()
        .success()
        .stdout(predicates::str::contains("facts_reference_regions"));
    Ok(())
}

#[test]
fn test_missing_project_fails_cleanly() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gridloom"));
    cmd.current_dir(tmp.path());
    cmd.arg("run").assert().failure();
    Ok(())
}
