//! Steps del template de regresión: split -> transform -> train.

pub mod split;
pub mod train;
pub mod transform;

use pipeflow_core::{Components, PipelineConfig, PipelineError, PipelineStep};

pub use split::SplitStep;
pub use train::TrainStep;
pub use transform::{output_feature_names, synthesized_feature_names, TransformStep};

pub const SPLIT: &str = "split";
pub const TRANSFORM: &str = "transform";
pub const TRAIN: &str = "train";

pub const TRAIN_FILE: &str = "train.json";
pub const VALIDATION_FILE: &str = "validation.json";
pub const TEST_FILE: &str = "test.json";

pub const TRANSFORMER_FILE: &str = "transformer.json";
pub const TRANSFORMED_TRAIN_FILE: &str = "transformed_training_data.json";
pub const TRANSFORMED_VALIDATION_FILE: &str = "transformed_validation_data.json";

pub const RUN_ID_FILE: &str = "run_id";

/// Construye los tres steps en orden. Cada uno valida su sección de
/// configuración y resuelve sus componentes aquí, antes de ejecutar nada.
pub fn standard_pipeline(config: &PipelineConfig, components: &Components) -> Result<Vec<Box<dyn PipelineStep>>, PipelineError> {
    Ok(vec![Box::new(SplitStep::from_pipeline(config)?),
            Box::new(TransformStep::from_pipeline(config, components)?),
            Box::new(TrainStep::from_pipeline(config, components)?)])
}
