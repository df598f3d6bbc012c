// gridloom-core/src/infrastructure/config.rs
//
// Project configuration: one main YAML manifest, hydrated from satellite
// fragments in the project's config directory, then layered with env-var
// overrides.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::domain::quality::GateDefinition;
use crate::domain::silver::SourceConfig;
use crate::domain::warehouse::{CapacityReference, LifecycleThresholds};
use crate::error::GridloomError;
use crate::infrastructure::error::InfrastructureError;

/// Runtime thresholds that are policy, not code. Everything here has a
/// serde default so a minimal manifest still runs.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineThresholds {
    #[serde(default)]
    pub lifecycle: LifecycleThresholds,

    /// Orphan fact rate (percent) above which the load summary is flagged
    /// as a warning condition.
    #[serde(default = "PipelineThresholds::default_orphan_warn_pct")]
    pub orphan_warn_pct: f64,

    /// Bound on concurrent per-source silver transforms.
    #[serde(default = "PipelineThresholds::default_transform_concurrency")]
    pub transform_concurrency: usize,
}

impl PipelineThresholds {
    fn default_orphan_warn_pct() -> f64 {
        10.0
    }

    fn default_transform_concurrency() -> usize {
        4
    }
}

impl Default for PipelineThresholds {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleThresholds::default(),
            orphan_warn_pct: Self::default_orphan_warn_pct(),
            transform_concurrency: Self::default_transform_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProjectConfig {
    pub name: String,

    /// Where run artifacts, checkpoints and the silver layer land.
    #[serde(default = "ProjectConfig::default_target_path")]
    pub target_path: String,

    #[serde(default = "ProjectConfig::default_warehouse_path")]
    pub warehouse_path: String,

    #[serde(default = "ProjectConfig::default_bronze_path")]
    pub bronze_path: String,

    /// Folders scanned for satellite fragments, relative to the project dir.
    #[serde(default = "ProjectConfig::default_config_paths")]
    pub config_paths: Vec<String>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub gates: Vec<GateDefinition>,

    #[serde(default)]
    pub capacity: CapacityReference,

    #[serde(default)]
    pub thresholds: PipelineThresholds,
}

impl ProjectConfig {
    fn default_target_path() -> String {
        "target/gridloom".to_string()
    }

    fn default_warehouse_path() -> String {
        "target/gridloom/warehouse.duckdb".to_string()
    }

    fn default_bronze_path() -> String {
        "bronze".to_string()
    }

    fn default_config_paths() -> Vec<String> {
        vec!["config".to_string()]
    }

    /// Resolve a configured path against the project dir (absolute paths
    /// pass through).
    pub fn resolve(&self, project_dir: &Path, configured: &str) -> PathBuf {
        let p = Path::new(configured);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            project_dir.join(p)
        }
    }

    pub fn target_dir(&self, project_dir: &Path) -> PathBuf {
        self.resolve(project_dir, &self.target_path)
    }

    pub fn bronze_dir(&self, project_dir: &Path) -> PathBuf {
        self.resolve(project_dir, &self.bronze_path)
    }

    pub fn silver_dir(&self, project_dir: &Path) -> PathBuf {
        self.target_dir(project_dir).join("silver")
    }

    pub fn warehouse_file(&self, project_dir: &Path) -> PathBuf {
        self.resolve(project_dir, &self.warehouse_path)
    }

    /// Semantic validation after all fragments are merged.
    pub fn validate(&self) -> Result<(), GridloomError> {
        if self.sources.is_empty() {
            return Err(InfrastructureError::ConfigError(
                "project declares no sources".to_string(),
            )
            .into());
        }
        let mut seen = std::collections::BTreeSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.as_str()) {
                return Err(InfrastructureError::ConfigError(format!(
                    "duplicate source '{}'",
                    source.name
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project manifest");

    let content = fs::read_to_string(&config_path)?;
    let mut config: ProjectConfig = serde_yaml::from_str(&content)?;

    for config_folder in config.config_paths.clone() {
        let config_dir = project_dir.join(config_folder);
        if config_dir.exists() {
            load_satellite_configs(&mut config, &config_dir)?;
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    let candidates = ["gridloom_project.yaml", "gridloom.yaml"];
    for filename in candidates {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, candidates
    )))
}

fn load_fragment<T: DeserializeOwned>(path: &Path) -> Result<T, InfrastructureError> {
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(Into::into)
}

fn load_satellite_configs(
    config: &mut ProjectConfig,
    config_dir: &Path,
) -> Result<(), InfrastructureError> {
    // A. Quality gates. A corrupt fragment stops the run; gates are never
    // silently dropped.
    let gates_path = config_dir.join("quality_gates.yml");
    if gates_path.exists() {
        #[derive(Deserialize)]
        struct GatesWrapper {
            gates: Vec<GateDefinition>,
        }

        let wrapper: GatesWrapper = load_fragment(&gates_path)?;
        config.gates.extend(wrapper.gates);
        info!(count = config.gates.len(), "  ✅ Quality gates loaded");
    }

    // B. Installed-capacity reference for load factors.
    let capacity_path = config_dir.join("capacity.yml");
    if capacity_path.exists() {
        config.capacity = load_fragment(&capacity_path)?;
        info!("  ⚡ Capacity reference loaded");
    }

    // C. Source configs, one file per source family.
    let sources_dir = config_dir.join("sources");
    if sources_dir.exists() {
        let mut entries: Vec<PathBuf> = fs::read_dir(&sources_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "yml" || e == "yaml")
            })
            .collect();
        entries.sort();
        for path in entries {
            let source: SourceConfig = load_fragment(&path)?;
            info!(source = %source.name, "  📄 Source config loaded");
            config.sources.push(source);
        }
    }

    Ok(())
}

fn apply_env_overrides(config: &mut ProjectConfig) {
    if let Ok(val) = std::env::var("GRIDLOOM_TARGET_PATH") {
        info!(old = ?config.target_path, new = ?val, "Overriding target path via ENV");
        config.target_path = val;
    }
    if let Ok(val) = std::env::var("GRIDLOOM_WAREHOUSE_PATH") {
        info!(old = ?config.warehouse_path, new = ?val, "Overriding warehouse path via ENV");
        config.warehouse_path = val;
    }
}
