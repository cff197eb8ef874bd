//! Subcomandos del CLI. Cada función devuelve su resultado en lugar de
//! imprimirlo; `main` decide el formato de salida.
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use serde_json::Value;

use pipeflow_core::engine::hash_outputs;
use pipeflow_core::{load_pipeline_config, Artifact, ArtifactLocator, PipelineEngine, PipelineReport, StepContext};
use pipeflow_serving::{load_pyfunc, ModelRegistry};
use pipeflow_steps::{builtin_components, register_pipeline_loader, standard_pipeline};
use pipeflow_tracking::open_store;

use crate::config::{AppConfig, DEFAULT_PROFILE};

/// Perfil efectivo: el de la línea de comandos, o el del entorno si difiere
/// del perfil por defecto (que puede no tener overlay).
fn effective_profile<'a>(cli_profile: Option<&'a str>, app: &'a AppConfig) -> Option<&'a str> {
    cli_profile.or_else(|| (app.profile != DEFAULT_PROFILE).then_some(app.profile.as_str()))
}

/// Arma split/transform/train desde `pipeline.yaml` y ejecuta hasta `step`.
pub fn run_pipeline(root: &Path, step: Option<&str>, profile: Option<&str>, app: &AppConfig) -> Result<PipelineReport> {
    let mut config = load_pipeline_config(root, effective_profile(profile, app))?;
    if config.experiment.name.is_none() {
        config.experiment.name = app.tracking.experiment_name.clone();
    }
    let uri = config.experiment.tracking_uri.as_deref().unwrap_or(&app.tracking.tracking_uri);
    let store = open_store(uri).with_context(|| format!("opening tracking store at '{uri}'"))?;
    let ctx = StepContext::new(&config, root, store)?;

    let mut engine = PipelineEngine::new(ctx);
    for s in standard_pipeline(&config, &builtin_components())? {
        engine.push_step(s);
    }
    info!("running pipeline '{}' (profile {}) steps [{}]",
          config.pipeline_name,
          config.profile,
          engine.step_names().join(", "));
    Ok(engine.run_until(step)?)
}

pub fn summarize(report: &PipelineReport) -> String {
    let mut out = String::new();
    for s in &report.steps {
        out.push_str(&format!("{:<10} {:>8.2}s  {}  {}\n",
                              s.step_name,
                              s.duration_secs,
                              &s.fingerprint[..s.fingerprint.len().min(16)],
                              s.card_path.display()));
    }
    out.push_str(&format!("pipeline fingerprint: {}\n", report.fingerprint));
    out
}

/// Artefactos ya producidos por un step, con su hash.
pub fn inspect_step(root: &Path, step: &str) -> Result<(Vec<Artifact>, std::path::PathBuf)> {
    let locator = ArtifactLocator::new(root);
    let outputs = locator.output_dir(step);
    if !outputs.is_dir() {
        bail!("step '{step}' has no outputs under {}; run it first", outputs.display());
    }
    Ok((hash_outputs(step, &outputs)?, locator.card_path(step)))
}

/// Carga el modelo con el dispatcher y predice sobre el JSON de `input`.
pub fn predict(model_dir: &Path, input: &Path) -> Result<Value> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let payload: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?;
    let mut registry = ModelRegistry::new();
    register_pipeline_loader(&mut registry, builtin_components());
    let model = load_pyfunc(model_dir, None, &registry)?;
    Ok(model.predict(&payload, None)?)
}

pub fn show_run(run_id: &str, app: &AppConfig) -> Result<Value> {
    let store = app.tracking.open_store()?;
    let run = store.get_run(run_id)?;
    Ok(Value::Object(run.to_mapping()))
}
