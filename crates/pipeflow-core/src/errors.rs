//! Errores del motor de pipelines.
//!
//! Taxonomía:
//! - `Config`, `UpstreamMissing`, `DependencyMissing`: no reintentables,
//!   abortan la construcción o ejecución del step.
//! - `Enrichment`, `Trial`: recuperables; se capturan en el límite más
//!   estrecho posible y degradan el reporte, nunca el artifact.
//! - El resto son fallos del camino primario y se propagan al driver.

use pipeflow_tracking::TrackingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("upstream step '{step}' has not produced '{path}'; run '{step}' first")]
    UpstreamMissing { step: String, path: String },
    #[error("missing dependency: {0}")]
    DependencyMissing(String),
    #[error("enrichment failed: {0}")]
    Enrichment(String),
    #[error("trial failed: {0}")]
    Trial(String),
    #[error("card error: {0}")]
    Card(String),
    #[error("estimator error: {0}")]
    Estimator(String),
    #[error("data error: {0}")]
    Data(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("tracking: {0}")]
    Tracking(#[from] TrackingError),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Trial(_) | PipelineError::Enrichment(_))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
