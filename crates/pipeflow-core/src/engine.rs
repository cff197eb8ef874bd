//! Motor secuencial de pipelines.
//!
//! Ejecuta los steps en el orden registrado, sin concurrencia entre ellos.
//! Por cada step: limpia su directorio de outputs, lo ejecuta, completa la
//! pestaña "Run Summary" de la card, la guarda como `card.html`, hashea los
//! archivos producidos y emite `StepFinished` con el fingerprint. Un fallo
//! emite `StepFailed` y detiene la ejecución (stop-on-failure).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use log::{error, info};
use serde_json::json;
use uuid::Uuid;

use crate::card::Card;
use crate::constants::{ENGINE_VERSION, RUN_SUMMARY_TAB};
use crate::errors::PipelineError;
use crate::event::{EventStore, InMemoryEventStore, PipelineEvent, PipelineEventKind};
use crate::hashing::{hash_file, hash_value};
use crate::model::{Artifact, StepContext};
use crate::step::PipelineStep;

/// Resultado de un step ejecutado con éxito.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step_name: String,
    pub card: Card,
    pub card_path: PathBuf,
    pub artifacts: Vec<Artifact>,
    pub fingerprint: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub steps: Vec<StepReport>,
    pub fingerprint: String,
}

pub struct PipelineEngine<E = InMemoryEventStore>
    where E: EventStore
{
    ctx: StepContext,
    steps: Vec<Box<dyn PipelineStep>>,
    event_store: E,
    last_run_id: Option<Uuid>,
}

impl PipelineEngine<InMemoryEventStore> {
    pub fn new(ctx: StepContext) -> Self {
        Self::with_event_store(ctx, InMemoryEventStore::default())
    }
}

impl<E> PipelineEngine<E> where E: EventStore
{
    pub fn with_event_store(ctx: StepContext, event_store: E) -> Self {
        Self { ctx, steps: Vec::new(), event_store, last_run_id: None }
    }

    /// Registra un step al final del pipeline.
    pub fn add_step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push_step(&mut self, step: Box<dyn PipelineStep>) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn context(&self) -> &StepContext {
        &self.ctx
    }

    pub fn last_run_id(&self) -> Option<Uuid> {
        self.last_run_id
    }

    pub fn events(&self, run_id: Uuid) -> Vec<PipelineEvent> {
        self.event_store.list(run_id)
    }

    /// Ejecuta todos los steps.
    pub fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        self.run_until(None)
    }

    /// Ejecuta los steps hasta `target` inclusive (todos si es `None`).
    pub fn run_until(&mut self, target: Option<&str>) -> Result<PipelineReport, PipelineError> {
        let last = match target {
            Some(name) => self.steps.iter().position(|s| s.name() == name).ok_or_else(|| {
                                                                                 PipelineError::config(format!("step '{name}' is not part of the pipeline (steps: {})",
                                                                                                               self.step_names().join(", ")))
                                                                             })?,
            None if self.steps.is_empty() => return Err(PipelineError::config("pipeline has no steps")),
            None => self.steps.len() - 1,
        };
        let target_name = self.steps[last].name().to_string();
        let mut ctx = self.ctx.clone();
        ctx.target_step = Some(target_name.clone());

        let run_id = Uuid::new_v4();
        self.last_run_id = Some(run_id);
        self.event_store.append_kind(run_id,
                                     PipelineEventKind::PipelineStarted { pipeline_name: ctx.pipeline_name.clone(),
                                                                          step_count: last + 1,
                                                                          target_step: target_name });

        let mut reports = Vec::with_capacity(last + 1);
        for index in 0..=last {
            let step = &self.steps[index];
            let step_name = step.name().to_string();
            self.event_store.append_kind(run_id,
                                         PipelineEventKind::StepStarted { step_index: index, step_name: step_name.clone() });
            info!("running step '{step_name}' ({}/{})", index + 1, last + 1);

            match execute_step(&ctx, index, step.as_ref()) {
                Ok(report) => {
                    info!("step '{step_name}' finished in {:.3}s with {} artifacts",
                          report.duration_secs,
                          report.artifacts.len());
                    self.event_store.append_kind(run_id,
                                                 PipelineEventKind::StepFinished { step_index: index,
                                                                                   step_name,
                                                                                   outputs: report.artifacts.clone(),
                                                                                   fingerprint: report.fingerprint.clone(),
                                                                                   duration_ms: (report.duration_secs * 1000.0)
                                                                                                as u64 });
                    reports.push(report);
                }
                Err(e) => {
                    error!("step '{step_name}' failed: {e}");
                    self.event_store.append_kind(run_id,
                                                 PipelineEventKind::StepFailed { step_index: index,
                                                                                 step_name,
                                                                                 error: e.to_string(),
                                                                                 retryable: e.is_retryable() });
                    return Err(e);
                }
            }
        }

        let step_fps: Vec<&str> = reports.iter().map(|r| r.fingerprint.as_str()).collect();
        let fingerprint = hash_value(&json!({
                                         "engine_version": ENGINE_VERSION,
                                         "pipeline_name": ctx.pipeline_name,
                                         "step_fingerprints": step_fps
                                     }));
        self.event_store.append_kind(run_id,
                                     PipelineEventKind::PipelineCompleted { pipeline_fingerprint: fingerprint.clone() });
        Ok(PipelineReport { run_id, steps: reports, fingerprint })
    }
}

fn execute_step(ctx: &StepContext, index: usize, step: &dyn PipelineStep) -> Result<StepReport, PipelineError> {
    let step_name = step.name();
    let output_dir = ctx.locator.output_dir(step_name);
    if output_dir.exists() {
        fs::remove_dir_all(&output_dir)?;
    }
    fs::create_dir_all(&output_dir)?;
    let card_path = ctx.locator.card_path(step_name);
    if card_path.exists() {
        fs::remove_file(&card_path)?;
    }

    let started = Instant::now();
    let mut card = step.run(ctx, &output_dir)?;
    let duration_secs = started.elapsed().as_secs_f64();

    card.fill_run_summary(RUN_SUMMARY_TAB, duration_secs, &Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let card_path = card.save_as_html(&ctx.locator.step_dir(step_name))?;

    let artifacts = hash_outputs(step_name, &output_dir)?;
    let output_hashes: Vec<[&str; 2]> = artifacts.iter().map(|a| [a.relative_path.as_str(), a.hash.as_str()]).collect();
    let fingerprint = hash_value(&json!({
                                     "engine_version": ENGINE_VERSION,
                                     "step_name": step_name,
                                     "step_index": index,
                                     "params": step.params(),
                                     "output_hashes": output_hashes
                                 }));
    Ok(StepReport { step_name: step_name.to_string(), card, card_path, artifacts, fingerprint, duration_secs })
}

/// Hashea (blake3) cada archivo bajo `output_dir`, en orden de ruta.
pub fn hash_outputs(step_name: &str, output_dir: &Path) -> Result<Vec<Artifact>, PipelineError> {
    let mut files = Vec::new();
    collect_files(output_dir, &mut files)?;
    files.sort();
    files.into_iter()
         .map(|path| -> Result<Artifact, PipelineError> {
             let relative = path.strip_prefix(output_dir)
                                .unwrap_or(&path)
                                .components()
                                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                                .collect::<Vec<_>>()
                                .join("/");
             Ok(Artifact { step_name: step_name.to_string(), relative_path: relative, hash: hash_file(&path)? })
         })
         .collect()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
