use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::{PipelineEvent, PipelineEventKind};

/// Almacenamiento de eventos append-only.
pub trait EventStore {
    /// Agrega un evento y devuelve el evento completo (con seq y ts).
    fn append_kind(&mut self, run_id: Uuid, kind: PipelineEventKind) -> PipelineEvent;
    /// Eventos de una ejecución en orden ascendente de seq.
    fn list(&self, run_id: Uuid) -> Vec<PipelineEvent>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: HashMap<Uuid, Vec<PipelineEvent>>,
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&mut self, run_id: Uuid, kind: PipelineEventKind) -> PipelineEvent {
        let events = self.inner.entry(run_id).or_default();
        let ev = PipelineEvent { seq: events.len() as u64, pipeline_run_id: run_id, kind, ts: Utc::now() };
        events.push(ev.clone());
        ev
    }

    fn list(&self, run_id: Uuid) -> Vec<PipelineEvent> {
        self.inner.get(&run_id).cloned().unwrap_or_default()
    }
}
