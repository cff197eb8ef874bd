//! Estado de trabajo compartido por los steps de una ejecución.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pipeflow_tracking::tags;
use pipeflow_tracking::{RunTag, TrackingStore};

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::model::ArtifactLocator;

#[derive(Clone)]
pub struct StepContext {
    pub pipeline_name: String,
    pub profile: String,
    pub template: String,
    pub target_col: String,
    pub locator: ArtifactLocator,
    pub tracking: Arc<dyn TrackingStore>,
    pub experiment_id: String,
    /// Step pedido por el usuario en esta ejecución.
    pub target_step: Option<String>,
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
         .field("pipeline_name", &self.pipeline_name)
         .field("profile", &self.profile)
         .field("root", &self.locator.root())
         .field("experiment_id", &self.experiment_id)
         .finish()
    }
}

impl StepContext {
    pub fn new(config: &PipelineConfig,
               pipeline_root: impl Into<PathBuf>,
               tracking: Arc<dyn TrackingStore>)
               -> Result<Self, PipelineError> {
        let experiment_id = tracking.get_or_create_experiment(config.experiment_name())?;
        Ok(Self { pipeline_name: config.pipeline_name.clone(),
                  profile: config.profile.clone(),
                  template: config.template.clone(),
                  target_col: config.target_col.clone(),
                  locator: ArtifactLocator::new(pipeline_root),
                  tracking,
                  experiment_id,
                  target_step: None })
    }

    pub fn pipeline_root(&self) -> &Path {
        self.locator.root()
    }

    /// Tags que identifican un run creado por un step del pipeline.
    pub fn pipeline_tags(&self, step_name: &str) -> Vec<RunTag> {
        vec![RunTag::new(tags::SOURCE_TYPE, tags::SOURCE_TYPE_PIPELINE),
             RunTag::new(tags::PIPELINE_TEMPLATE_NAME, self.template.clone()),
             RunTag::new(tags::PIPELINE_PROFILE_NAME, self.profile.clone()),
             RunTag::new(tags::PIPELINE_STEP_NAME, self.target_step.clone().unwrap_or_else(|| step_name.to_string()))]
    }
}
