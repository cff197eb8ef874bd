//! pipeflow-core: protocolo de steps, handoff de artifacts y tuning.
pub mod capability;
pub mod card;
pub mod components;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod metrics;
pub mod model;
pub mod step;
pub mod tuning;

pub use capability::{Estimator, ParamValue, Params, SavedComponent, Transformed, Transformer};
pub use card::{Card, CardTab};
pub use components::Components;
pub use config::{load_pipeline_config, PipelineConfig};
pub use engine::{PipelineEngine, PipelineReport, StepReport};
pub use errors::PipelineError;
pub use event::{EventStore, InMemoryEventStore, PipelineEvent, PipelineEventKind};
pub use metrics::MetricDefinition;
pub use model::{Artifact, ArtifactLocator, Frame, StepContext};
pub use step::PipelineStep;
