//! Claves de tags reservadas (compatibles con el servidor de tracking).

pub const RUN_NAME: &str = "mlflow.runName";
pub const PARENT_RUN_ID: &str = "mlflow.parentRunId";
pub const SOURCE_TYPE: &str = "mlflow.source.type";
pub const PIPELINE_TEMPLATE_NAME: &str = "mlflow.pipeline.template.name";
pub const PIPELINE_PROFILE_NAME: &str = "mlflow.pipeline.profile.name";
pub const PIPELINE_STEP_NAME: &str = "mlflow.pipeline.step.name";

/// Valor de `SOURCE_TYPE` para runs lanzados por un pipeline.
pub const SOURCE_TYPE_PIPELINE: &str = "PIPELINE";
