//! Modelos neutrales (Artifact, Frame, StepContext).

pub mod artifact;
pub mod context;
pub mod frame;

pub use artifact::{Artifact, ArtifactLocator};
pub use context::StepContext;
pub use frame::{ColumnProfile, ColumnSchema, Frame};
