//! Step `train`.
//!
//! Resuelve todos los artifacts upstream antes de escribir nada, abre un run
//! de tracking, opcionalmente afina hiperparámetros (un run anidado por
//! trial), entrena el estimador final, lo evalúa en train y validation,
//! persiste el pipeline de inferencia y construye la card. Leaderboard y
//! tabla de trials son enriquecimientos: si fallan sólo se pierde su pestaña.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};
use pipeflow_core::capability::{params_to_json, Estimator, Params, SavedComponent};
use pipeflow_core::card::{escape_html, format_sig, render_profile, render_table, RUN_SUMMARY_TEMPLATE};
use pipeflow_core::components::EstimatorFactory;
use pipeflow_core::config::{TrainConfig, TuningConfig};
use pipeflow_core::constants::RUN_SUMMARY_TAB;
use pipeflow_core::metrics::{self, MetricDefinition};
use pipeflow_core::tuning::{select_best_params, tune, BestParameters, SearchAlgorithm, TrialOutcome};
use pipeflow_core::{Card, Components, Frame, PipelineConfig, PipelineError, PipelineStep, StepContext};
use pipeflow_serving::ColSpec;
use pipeflow_tracking::{RunHandle, RunStatus, TrackingError};
use serde_json::{json, Value};

use super::{RUN_ID_FILE, SPLIT, TRAIN, TRAIN_FILE, TRANSFORM, TRANSFORMED_TRAIN_FILE, TRANSFORMED_VALIDATION_FILE, TRANSFORMER_FILE,
            VALIDATION_FILE};
use crate::inference::{InferencePipeline, MODEL_DIR};
use crate::leaderboard::{build_leaderboard, build_tuning_table};

const TRAINING: &str = "training";
const VALIDATION: &str = "validation";
const WORST_EXAMPLES: usize = 10;

pub struct TrainStep {
    config: TrainConfig,
    target_col: String,
    primary: String,
    metrics: Vec<MetricDefinition>,
    estimator_factory: EstimatorFactory,
    algorithm: Option<SearchAlgorithm>,
    components: Components,
}

impl std::fmt::Debug for TrainStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainStep")
         .field("estimator_method", &self.config.estimator_method)
         .field("primary", &self.primary)
         .field("tuning", &self.algorithm)
         .finish()
    }
}

/// Datos compartidos (sólo lectura) por todos los trials.
struct TrainingData {
    x_train: Frame,
    y_train: Vec<f64>,
    x_val: Frame,
    y_val: Vec<f64>,
}

/// Loguea parámetros sin romper la inmutabilidad del run: un valor distinto
/// al ya logueado se avisa y se conserva el original.
fn log_params_checked(run: &RunHandle, params: &Params) -> Result<(), PipelineError> {
    let mut logged = run.store().get_run(run.run_id())?.data_or_empty().param_values();
    for (key, value) in params {
        if let Some(existing) = logged.get(key) {
            if !value.matches_logged(existing) {
                warn!("parameter '{key}' already logged as '{existing}'; ignoring new value '{value}'");
            }
            continue;
        }
        match run.log_param(key, value) {
            Ok(()) => {
                logged.insert(key.clone(), value.to_string());
            }
            Err(TrackingError::ParamConflict { key, existing, new }) => {
                warn!("parameter '{key}' already logged as '{existing}'; ignoring new value '{new}'");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn merged(base: &Params, overlay: &Params) -> Params {
    let mut out = base.clone();
    for (k, v) in overlay {
        out.insert(k.clone(), v.clone());
    }
    out
}

fn metrics_table(primary: &str, metric_defs: &[MetricDefinition], results: &IndexMap<String, IndexMap<String, f64>>) -> String {
    let mut headers = vec!["Metric".to_string()];
    headers.extend(results.keys().cloned());
    let mut rows = Vec::new();
    for name in metrics::display_order(primary, metric_defs) {
        let mut row = vec![name.clone()];
        row.extend(results.values().map(|v| v.get(&name).map(|x| format_sig(*x, 6)).unwrap_or_default()));
        rows.push(row);
    }
    render_table(&headers, &rows)
}

/// Las `n` filas crudas con mayor error absoluto, precedidas de
/// `absolute_error` y `prediction`.
pub fn worst_examples(raw: &Frame, target: &[f64], predictions: &[f64], n: usize) -> Result<Frame, PipelineError> {
    let mut order: Vec<(usize, f64)> = target.iter()
                                             .zip(predictions)
                                             .enumerate()
                                             .map(|(i, (t, p))| (i, (p - t).abs()))
                                             .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    order.truncate(n);
    let idx: Vec<usize> = order.iter().map(|(i, _)| *i).collect();
    raw.take_rows(&idx)
       .insert_column(0, "absolute_error", order.iter().map(|(_, e)| *e).collect())?
       .insert_column(1, "prediction", idx.iter().map(|i| predictions[*i]).collect())
}

fn frame_table(frame: &Frame) -> String {
    let rows: Vec<Vec<String>> = frame.rows().iter().map(|r| r.iter().map(|v| format_sig(*v, 6)).collect()).collect();
    render_table(frame.columns(), &rows)
}

impl TrainStep {
    pub fn from_pipeline(config: &PipelineConfig, components: &Components) -> Result<Self, PipelineError> {
        let train = TrainConfig::from_pipeline(config)?;
        let primary = config.metrics.primary_metric().to_string();
        let metrics = metrics::resolve_metrics(&primary, &config.metrics.custom, components)?;
        let estimator_factory = components.estimator_factory(&train.estimator_method)?;
        let algorithm = train.tuning.as_ref().map(|t| SearchAlgorithm::resolve(&t.algorithm)).transpose()?;
        Ok(Self { config: train,
                  target_col: config.target_col.clone(),
                  primary,
                  metrics,
                  estimator_factory,
                  algorithm,
                  components: components.clone() })
    }

    fn primary_def(&self) -> Result<&MetricDefinition, PipelineError> {
        metrics::find(&self.metrics, &self.primary).ok_or_else(|| PipelineError::config(format!("unknown primary metric '{}'", self.primary)))
    }

    /// Un trial: run anidado, ajuste sobre la muestra de train, evaluación en
    /// validation, pérdida firmada de la métrica primaria.
    fn run_trial(&self,
                 parent: &RunHandle,
                 data: &TrainingData,
                 sample: &(Frame, Vec<f64>),
                 index: usize,
                 args: &Params)
                 -> Result<TrialOutcome, PipelineError> {
        let trial = parent.begin_nested(Some(&format!("trial-{index}")))?;
        let mut estimator = (self.estimator_factory)(args)?;
        estimator.fit(&sample.0, &sample.1)?;
        let predictions = estimator.predict(&data.x_val)?;
        let values = metrics::evaluate(&self.metrics, &data.y_val, &predictions);
        for (name, value) in &values {
            trial.log_metric(&metrics::tracking_key(name, VALIDATION), *value)?;
        }
        log_params_checked(&trial, &estimator.params())?;
        log_params_checked(&trial, args)?;
        let primary = self.primary_def()?;
        let value = values.get(&self.primary).copied().unwrap_or(f64::NAN);
        let run_id = trial.run_id().to_string();
        trial.finish(RunStatus::Finished)?;
        Ok(TrialOutcome { loss: primary.loss(value), run_id: Some(run_id) })
    }

    fn tune(&self, run: &RunHandle, data: &TrainingData, tuning: &TuningConfig) -> Result<BestParameters, PipelineError> {
        let algorithm = self.algorithm.unwrap_or(SearchAlgorithm::Random);
        let idx = data.x_train.sample_indices(tuning.sample_fraction, tuning.seed);
        let sample = (data.x_train.take_rows(&idx), idx.iter().map(|i| data.y_train[*i]).collect::<Vec<f64>>());
        debug!("tuning on {} of {} training rows", sample.0.n_rows(), data.x_train.n_rows());

        let hardcoded = &self.config.estimator_params;
        let objective = |index: usize, sampled: &Params| self.run_trial(run, data, &sample, index, &merged(hardcoded, sampled));
        let result = tune(&objective,
                          &tuning.space,
                          algorithm,
                          tuning.max_trials,
                          tuning.parallelism,
                          tuning.seed)?;

        let hardcoded_loss = match objective(tuning.max_trials, &Params::new()) {
            Ok(outcome) if outcome.loss.is_finite() => Some(outcome.loss),
            Ok(outcome) => {
                warn!("hardcoded configuration produced a non-finite loss ({})", outcome.loss);
                None
            }
            Err(e) => {
                warn!("hardcoded configuration failed to evaluate: {e}");
                None
            }
        };
        info!("tuning finished: {} trials, {} failed", result.trials.len(), result.failed());
        select_best_params(&result, hardcoded, hardcoded_loss)
    }
}

impl PipelineStep for TrainStep {
    fn name(&self) -> &str {
        TRAIN
    }

    fn params(&self) -> Value {
        json!({"estimator_method": self.config.estimator_method,
               "estimator_params": params_to_json(&self.config.estimator_params),
               "primary_metric": self.primary,
               "tuning": self.config.tuning.as_ref().map(|t| json!({
                   "max_trials": t.max_trials,
                   "algorithm": t.algorithm,
                   "parameters": t.space.raw(),
                   "sample_fraction": t.sample_fraction,
                   "seed": t.seed,
               })),
               "target_col": self.target_col})
    }

    fn run(&self, ctx: &StepContext, output_dir: &Path) -> Result<Card, PipelineError> {
        let transformed_train_path = ctx.locator.resolve(TRANSFORM, TRANSFORMED_TRAIN_FILE)?;
        let transformed_val_path = ctx.locator.resolve(TRANSFORM, TRANSFORMED_VALIDATION_FILE)?;
        let transformer_path = ctx.locator.resolve(TRANSFORM, TRANSFORMER_FILE)?;
        let raw_train_path = ctx.locator.resolve(SPLIT, TRAIN_FILE)?;
        let raw_val_path = ctx.locator.resolve(SPLIT, VALIDATION_FILE)?;

        let (x_train, y_train) = Frame::read_json(&transformed_train_path)?.split_target(&self.target_col)?;
        let (x_val, y_val) = Frame::read_json(&transformed_val_path)?.split_target(&self.target_col)?;
        let data = Arc::new(TrainingData { x_train, y_train, x_val, y_val });
        let raw_train = Frame::read_json(&raw_train_path)?;
        let raw_val = Frame::read_json(&raw_val_path)?;
        let saved_transformer: SavedComponent = serde_json::from_slice(&fs::read(&transformer_path)?)?;
        let transformer = self.components.restore_transformer(&saved_transformer)?;

        let run = RunHandle::begin(ctx.tracking.clone(), &ctx.experiment_id, None, &ctx.pipeline_tags(TRAIN))?;
        let run_id = run.run_id().to_string();
        info!("train step started tracking run {run_id}");

        let best = match &self.config.tuning {
            Some(tuning) => {
                let best = self.tune(&run, &data, tuning)?;
                let path = best.write(output_dir)?;
                run.log_artifact(&path)?;
                Some(best)
            }
            None => None,
        };
        let params = best.as_ref().map(|b| b.combined.clone()).unwrap_or_else(|| self.config.estimator_params.clone());

        let mut estimator: Box<dyn Estimator> = (self.estimator_factory)(&params)?;
        estimator.fit(&data.x_train, &data.y_train)?;
        log_params_checked(&run, &estimator.params())?;

        let feature_columns: Vec<String> = raw_train.columns().iter().filter(|c| **c != self.target_col).cloned().collect();
        let pipeline = InferencePipeline::new(feature_columns,
                                              data.x_train.columns().to_vec(),
                                              &self.target_col,
                                              transformer,
                                              estimator);
        pipeline.save(&output_dir.join(MODEL_DIR), Some(run_id.as_str()))?;
        fs::write(output_dir.join(RUN_ID_FILE), &run_id)?;

        let mut results: IndexMap<String, IndexMap<String, f64>> = IndexMap::new();
        for (dataset, x, y) in [(TRAINING, &data.x_train, &data.y_train), (VALIDATION, &data.x_val, &data.y_val)] {
            let predictions = pipeline.estimator().predict(x)?;
            let values = metrics::evaluate(&self.metrics, y, &predictions);
            for (name, value) in &values {
                run.log_metric(&metrics::tracking_key(name, dataset), *value)?;
            }
            let eval_dir = output_dir.join(format!("eval_{dataset}"));
            fs::create_dir_all(&eval_dir)?;
            fs::write(eval_dir.join("metrics.json"), serde_json::to_vec_pretty(&values)?)?;
            results.insert(dataset.to_string(), values);
        }
        info!("{} on validation: {}",
              self.primary,
              results.get(VALIDATION).and_then(|v| v.get(&self.primary)).map(|v| format_sig(*v, 6)).unwrap_or_default());

        let y_raw_val = raw_val.column(&self.target_col)?;
        let val_predictions = pipeline.predict(&raw_val)?;
        let errors: Vec<f64> = val_predictions.iter().zip(&y_raw_val).map(|(p, t)| p - t).collect();
        let pred_and_error = Frame::from_columns(vec![(self.target_col.clone(), y_raw_val),
                                                      ("prediction".to_string(), val_predictions),
                                                      ("error".to_string(), errors)])?;

        let y_raw_train = raw_train.column(&self.target_col)?;
        let train_predictions = pipeline.predict(&raw_train)?;
        let worst = worst_examples(&raw_train, &y_raw_train, &train_predictions, WORST_EXAMPLES)?;

        let latest = results.get(VALIDATION).cloned().unwrap_or_default();
        let leaderboard = match build_leaderboard(ctx.tracking.as_ref(),
                                                  &ctx.experiment_id,
                                                  &run_id,
                                                  run.info().start_time,
                                                  &latest,
                                                  &self.metrics,
                                                  &self.primary)
        {
            Ok(lb) => Some(lb),
            Err(e) => {
                warn!("Failed to build model leaderboard due to unexpected failure: {e}");
                None
            }
        };
        let tuning_table = match &self.config.tuning {
            Some(tuning) => {
                let tuned: Vec<String> = tuning.space.names().map(str::to_string).collect();
                match build_tuning_table(ctx.tracking.as_ref(), &ctx.experiment_id, &run_id, self.primary_def()?, &tuned) {
                    Ok(html) => Some(html),
                    Err(e) => {
                        warn!("Failed to build tuning table due to unexpected failure: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        let mut card = Card::new(&ctx.pipeline_name, TRAIN);
        card.add_tab("Model Performance Summary Metrics", "<h3 class='section-title'>Summary Metrics</h3>{{ METRICS }} ")?
            .add_html("METRICS", metrics_table(&self.primary, &self.metrics, &results));
        if !self.config.skip_data_profiling {
            card.add_tab("Profile of Predictions and Errors", "{{PROFILE}}")?
                .add_html("PROFILE", render_profile("Predictions and Errors (validation)", &pred_and_error.profile()));
        }
        card.add_tab("Model Architecture", "{{MODEL_ARCH}}")?
            .add_text("MODEL_ARCH", &pipeline.describe());
        let signature = pipeline.signature();
        let schema_headers = vec!["Name".to_string(), "Type".to_string()];
        let spec_rows = |cols: &[ColSpec]| -> Vec<Vec<String>> {
            cols.iter().map(|c| vec![c.name.clone().unwrap_or_default(), c.dtype.clone()]).collect()
        };
        card.add_tab("Model Schema", "{{MODEL_SCHEMA}}")?
            .add_html("MODEL_SCHEMA",
                      format!("<h3>Inputs</h3>{}<h3>Outputs</h3>{}",
                              render_table(&schema_headers, &spec_rows(&signature.inputs)),
                              render_table(&schema_headers, &spec_rows(&signature.outputs))));
        card.add_tab("Training Examples with Largest Prediction Error", "{{ WORST_EXAMPLES_TABLE }}")?
            .add_html("WORST_EXAMPLES_TABLE", frame_table(&worst));
        if let Some(lb) = &leaderboard {
            card.add_tab("Leaderboard", "{{ LEADERBOARD_TABLE }}")?
                .add_html("LEADERBOARD_TABLE", lb.to_html());
        }
        card.add_tab(RUN_SUMMARY_TAB, RUN_SUMMARY_TEMPLATE)?
            .add_html("RUN_ID", format!("<b>Run ID:</b> {}<br><br>", escape_html(&run_id)))
            .add_html("MODEL_URI", format!("<b>Model URI:</b> runs:/{}/train/model<br><br>", escape_html(&run_id)));
        if let (Some(best), Some(tuning)) = (&best, &self.config.tuning) {
            let space = serde_yaml::to_string(tuning.space.raw())?;
            card.add_tab("Best Parameters", "{{ SEARCH_SPACE }} {{ BEST_PARAMETERS }} ")?
                .add_html("SEARCH_SPACE", format!("<b>Tuning search space:</b> <pre>{}</pre>", escape_html(&space)))
                .add_html("BEST_PARAMETERS", format!("<b>Best parameters:</b><pre>{}</pre>", escape_html(&best.to_yaml()?)));
        }
        if let Some(html) = tuning_table {
            card.add_tab("Tuning Trials", "{{ TUNING_TABLE }}")?
                .add_html("TUNING_TABLE", html);
        }

        run.finish(RunStatus::Finished)?;
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_examples_sorted_by_absolute_error() {
        let raw = Frame::new(vec!["x".into(), "y".into()], vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]]).unwrap();
        let worst = worst_examples(&raw, &[1.0, 2.0, 3.0], &[1.5, 0.0, 3.0], 2).unwrap();
        assert_eq!(worst.columns(), &["absolute_error", "prediction", "x", "y"]);
        assert_eq!(worst.rows()[0], vec![2.0, 0.0, 2.0, 2.0]);
        assert_eq!(worst.rows()[1], vec![0.5, 1.5, 1.0, 1.0]);
    }
}
