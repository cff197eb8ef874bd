//! `RunHandle`: adquisición explícita de un run de tracking.
//!
//! No hay "run actual" global: quien necesita loguear recibe el handle. El
//! run se cierra con `finish`; si el handle se descarta sin cerrarse (salida
//! por `?`, panic) el `Drop` lo marca como `FAILED`.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::entities::{Metric, Param, RunInfo, RunStatus, RunTag};
use crate::error::TrackingError;
use crate::store::{now_millis, TrackingStore};
use crate::tags;

pub struct RunHandle {
    store: Arc<dyn TrackingStore>,
    info: RunInfo,
    finished: bool,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle").field("run_id", &self.info.run_id).field("finished", &self.finished).finish()
    }
}

impl RunHandle {
    /// Crea un run nuevo en `experiment_id`.
    pub fn begin(store: Arc<dyn TrackingStore>,
                 experiment_id: &str,
                 run_name: Option<&str>,
                 tags: &[RunTag])
                 -> Result<Self, TrackingError> {
        let info = store.create_run(experiment_id, run_name, tags)?;
        Ok(Self { store, info, finished: false })
    }

    /// Crea un run hijo etiquetado con `mlflow.parentRunId`.
    pub fn begin_nested(&self, run_name: Option<&str>) -> Result<RunHandle, TrackingError> {
        let tags = [RunTag::new(tags::PARENT_RUN_ID, self.info.run_id.clone())];
        RunHandle::begin(self.store.clone(), &self.info.experiment_id, run_name, &tags)
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn experiment_id(&self) -> &str {
        &self.info.experiment_id
    }

    pub fn store(&self) -> &Arc<dyn TrackingStore> {
        &self.store
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<(), TrackingError> {
        self.store.log_metric(&self.info.run_id,
                              Metric { key: key.to_string(), value, timestamp: now_millis(), step: 0 })
    }

    pub fn log_param(&self, key: &str, value: impl Display) -> Result<(), TrackingError> {
        self.store.log_param(&self.info.run_id, Param { key: key.to_string(), value: value.to_string() })
    }

    pub fn set_tag(&self, key: &str, value: impl Into<String>) -> Result<(), TrackingError> {
        self.store.set_tag(&self.info.run_id, RunTag::new(key, value))
    }

    pub fn log_artifact(&self, local_path: &Path) -> Result<PathBuf, TrackingError> {
        self.store.log_artifact(&self.info.run_id, local_path)
    }

    /// Cierra el run con el estado indicado.
    pub fn finish(mut self, status: RunStatus) -> Result<RunInfo, TrackingError> {
        self.finished = true;
        let info = self.store.update_run(&self.info.run_id, status, Some(now_millis()))?;
        self.info = info.clone();
        Ok(info)
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.update_run(&self.info.run_id, RunStatus::Failed, Some(now_millis())) {
            warn!("could not mark run {} as failed: {e}", self.info.run_id);
        }
    }
}
