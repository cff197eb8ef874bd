//! pipeflow-steps: componentes incluidos y steps del template de regresión
//! (split, transform, train), más el pipeline de inferencia servible.
pub mod builtins;
pub mod inference;
pub mod leaderboard;
pub mod steps;

pub use builtins::builtin_components;
pub use inference::{register_pipeline_loader, InferencePipeline, PipelineModel, SavedPipeline, PIPELINE_LOADER};
pub use leaderboard::{build_leaderboard, build_tuning_table, rank_labels, Leaderboard};
pub use steps::{standard_pipeline, SplitStep, TrainStep, TransformStep};
