//! Tipos de evento del pipeline.
//!
//! Cada ejecución del `PipelineEngine` emite eventos a un `EventStore`
//! append-only; son el registro observable de qué step corrió, qué produjo y
//! dónde se detuvo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Artifact;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEventKind {
    /// Primer evento de cada ejecución.
    PipelineStarted { pipeline_name: String, step_count: usize, target_step: String },
    StepStarted { step_index: usize, step_name: String },
    StepFinished {
        step_index: usize,
        step_name: String,
        outputs: Vec<Artifact>,
        fingerprint: String,
        duration_ms: u64,
    },
    /// Error terminal: la ejecución no continúa (stop-on-failure).
    StepFailed {
        step_index: usize,
        step_name: String,
        error: String,
        retryable: bool,
    },
    /// Fingerprint agregado de los steps ejecutados, en orden.
    PipelineCompleted { pipeline_fingerprint: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub seq: u64,
    pub pipeline_run_id: Uuid,
    pub kind: PipelineEventKind,
    pub ts: DateTime<Utc>, // metadato (no entra en fingerprint)
}
