//! Configuración declarativa del pipeline.
//!
//! `pipeline.yaml` en la raíz del pipeline, opcionalmente sobrescrito por
//! `profiles/<perfil>.yaml` (merge profundo). Cada step parsea y valida su
//! propia sección al construirse; los campos obligatorios ausentes son
//! `PipelineError::Config` antes de ejecutar nada.

pub mod merge;
pub mod steps;

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::{DEFAULT_PRIMARY_METRIC, DEFAULT_PROFILE, DEFAULT_TEMPLATE, PIPELINE_FILE, PROFILES_DIR};
use crate::errors::PipelineError;
use crate::metrics::CustomMetricConfig;

pub use merge::merge_json;
pub use steps::{SplitConfig, TrainConfig, TransformConfig, TuningConfig};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExperimentConfig {
    pub name: Option<String>,
    pub tracking_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetricsConfig {
    pub primary: Option<String>,
    #[serde(default)]
    pub custom: Vec<CustomMetricConfig>,
}

impl MetricsConfig {
    pub fn primary_metric(&self) -> &str {
        self.primary.as_deref().unwrap_or(DEFAULT_PRIMARY_METRIC)
    }
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_template")]
    pub template: String,
    pub target_col: String,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Secciones crudas por step; cada step valida la suya.
    #[serde(default)]
    pub steps: IndexMap<String, Value>,
    #[serde(skip)]
    pub profile: String,
    #[serde(skip)]
    pub pipeline_name: String,
}

impl PipelineConfig {
    pub fn from_value(value: Value, profile: &str, pipeline_name: &str) -> Result<Self, PipelineError> {
        let mut config: PipelineConfig =
            serde_json::from_value(value).map_err(|e| PipelineError::config(format!("invalid pipeline configuration: {e}")))?;
        if config.target_col.trim().is_empty() {
            return Err(PipelineError::config("'target_col' must not be empty"));
        }
        config.profile = profile.to_string();
        config.pipeline_name = pipeline_name.to_string();
        Ok(config)
    }

    pub fn step_section(&self, step_name: &str) -> Option<&Value> {
        self.steps.get(step_name)
    }

    pub fn experiment_name(&self) -> &str {
        self.experiment.name.as_deref().unwrap_or(&self.pipeline_name)
    }
}

fn read_yaml(path: &Path) -> Result<Value, PipelineError> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| PipelineError::config(format!("invalid YAML in {}: {e}", path.display())))
}

/// Carga `pipeline.yaml` y aplica el perfil. Un perfil pedido
/// explícitamente debe existir; el perfil por defecto es opcional.
pub fn load_pipeline_config(root: &Path, profile: Option<&str>) -> Result<PipelineConfig, PipelineError> {
    let path = root.join(PIPELINE_FILE);
    if !path.is_file() {
        return Err(PipelineError::config(format!("{} not found", path.display())));
    }
    let mut value = read_yaml(&path)?;

    let profile_name = profile.unwrap_or(DEFAULT_PROFILE);
    let overlay_path = root.join(PROFILES_DIR).join(format!("{profile_name}.yaml"));
    if overlay_path.is_file() {
        debug!("applying profile overlay {}", overlay_path.display());
        value = merge_json(&value, &read_yaml(&overlay_path)?);
    } else if profile.is_some() {
        return Err(PipelineError::config(format!("profile '{profile_name}' not found at {}", overlay_path.display())));
    }

    let pipeline_name = root.canonicalize()
                            .ok()
                            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                            .unwrap_or_else(|| "pipeline".to_string());
    PipelineConfig::from_value(value, profile_name, &pipeline_name)
}
