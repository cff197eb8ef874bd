mod common;

use std::fs;
use std::sync::Arc;

use pipeflow_core::tuning::BEST_PARAMETERS_FILE;
use pipeflow_serving::{load_pyfunc, ModelKind, ModelRegistry, ServingError};
use pipeflow_steps::builtins::{LINEAR_REGRESSION, STANDARD_SCALER};
use pipeflow_steps::{builtin_components, register_pipeline_loader, InferencePipeline};
use pipeflow_tracking::{tags, InMemoryTrackingStore, RunFilter, RunStatus, TrackingStore};
use serde_json::json;

fn tuned_config(low: f64, high: f64) -> serde_json::Value {
    json!({
        "target_col": "y",
        "steps": {
            "split": {"source": "data.csv"},
            "transform": {"transformer_method": STANDARD_SCALER},
            "train": {
                "estimator_method": LINEAR_REGRESSION,
                "estimator_params": {"alpha": 0.0},
                "tuning": {
                    "enabled": true,
                    "max_trials": 4,
                    "parallelism": 2,
                    "parameters": {"alpha": {"distribution": "uniform", "low": low, "high": high}}
                }
            }
        }
    })
}

#[test]
fn split_transform_train_produces_servable_model() {
    let dir = tempfile::tempdir().unwrap();
    common::write_dataset(dir.path(), 160);
    let config = common::config(tuned_config(0.0, 2.0));
    let components = builtin_components();
    let store = Arc::new(InMemoryTrackingStore::new());
    let mut engine = common::engine(dir.path(), &config, &components, store.clone());

    let report = engine.run().unwrap();
    let names: Vec<&str> = report.steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["split", "transform", "train"]);

    let train = &report.steps[2];
    let paths: Vec<&str> = train.artifacts.iter().map(|a| a.relative_path.as_str()).collect();
    for expected in ["model/model.json", "model/MLmodel", "run_id", "eval_training/metrics.json", "eval_validation/metrics.json", BEST_PARAMETERS_FILE] {
        assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
    }
    assert_eq!(train.card.tab_names(),
               vec!["Model Performance Summary Metrics",
                    "Profile of Predictions and Errors",
                    "Model Architecture",
                    "Model Schema",
                    "Training Examples with Largest Prediction Error",
                    "Leaderboard",
                    "Run Summary",
                    "Best Parameters",
                    "Tuning Trials"]);
    let summary = train.card.tab("Run Summary").unwrap().render();
    let locator = engine.context().locator.clone();
    let run_id = fs::read_to_string(locator.path("train", "run_id")).unwrap();
    assert!(summary.contains(&format!("runs:/{run_id}/train/model")));

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.info.status, RunStatus::Finished);
    let data = run.data_or_empty();
    assert_eq!(data.tag(tags::PIPELINE_STEP_NAME), Some("train"));
    assert!(data.metric_values().contains_key("root_mean_squared_error_on_data_validation"));
    assert!(data.metric_values().contains_key("r2_score_on_data_training"));

    // 4 trials + la evaluación de la configuración fija.
    let exp = vec![run.info.experiment_id.clone()];
    let trials = store.search_runs(&exp, &RunFilter::active().with_tag(tags::PARENT_RUN_ID, run_id.clone()), None, 100)
                      .unwrap();
    assert_eq!(trials.len(), 5);
    assert!(trials.iter().all(|t| t.info.status == RunStatus::Finished));
    assert_eq!(store.artifacts_of(&run_id).len(), 1);

    let mut registry = ModelRegistry::new();
    register_pipeline_loader(&mut registry, components.clone());
    let model = load_pyfunc(&locator.path("train", "model"), None, &registry).unwrap();
    assert_eq!(model.kind(), ModelKind::Custom);
    let out = model.predict(&json!([{"x1": 1.0, "x2": 2.0}, {"x1": 0.5, "x2": 0.0}]), None).unwrap();
    let predictions = out.as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p.as_f64().map(f64::is_finite).unwrap_or(false)));
    assert!(matches!(model.predict(&json!([{"x1": 1.0}]), None), Err(ServingError::InvalidInput(_))));

    let pipeline = InferencePipeline::load(&locator.path("train", "model"), &components).unwrap();
    assert_eq!(pipeline.feature_columns(), &["x1".to_string(), "x2".to_string()]);
}

#[test]
fn worse_samples_keep_hardcoded_parameters() {
    let dir = tempfile::tempdir().unwrap();
    common::write_dataset(dir.path(), 160);
    let config = common::config(tuned_config(500.0, 1000.0));
    let components = builtin_components();
    let store = Arc::new(InMemoryTrackingStore::new());
    let mut engine = common::engine(dir.path(), &config, &components, store);
    engine.run().unwrap();

    let locator = engine.context().locator.clone();
    let yaml = fs::read_to_string(locator.path("train", BEST_PARAMETERS_FILE)).unwrap();
    assert!(yaml.starts_with("# tuned hyperparameters\n# hardcoded parameters\n"), "{yaml}");
    assert!(yaml.contains("alpha: 0.0"));

    let model: serde_json::Value = serde_json::from_slice(&fs::read(locator.path("train", "model/model.json")).unwrap()).unwrap();
    assert_eq!(model["estimator"]["state"]["alpha"], json!(0.0));
}

fn untuned_engine(root: &std::path::Path, components: &pipeflow_core::Components) -> pipeflow_core::PipelineEngine {
    common::write_dataset(root, 120);
    let config = common::config(json!({
        "target_col": "y",
        "steps": {"split": {"source": "data.csv"}, "train": {"estimator_method": LINEAR_REGRESSION}}
    }));
    common::engine(root, &config, components, Arc::new(InMemoryTrackingStore::new()))
}

#[test]
fn first_run_leads_its_own_leaderboard() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = untuned_engine(dir.path(), &builtin_components());
    let report = engine.run().unwrap();

    let leaderboard = report.steps[2].card.tab("Leaderboard").unwrap().render();
    assert!(leaderboard.contains("<th>Latest</th><th>Best</th></tr>"), "{leaderboard}");
    assert!(!leaderboard.contains("2nd Best"));
    assert!(leaderboard.contains("<tr><td>Model Rank</td><td>1</td><td>1</td></tr>"), "{leaderboard}");
    assert!(!leaderboard.contains("&gt; 0"));
}

#[test]
fn second_run_is_ranked_against_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = untuned_engine(dir.path(), &builtin_components());
    engine.run().unwrap();
    let report = engine.run().unwrap();

    // Mismos datos y modelo: los dos runs empatan y comparten el rango 1.
    let leaderboard = report.steps[2].card.tab("Leaderboard").unwrap().render();
    assert!(leaderboard.contains("<th>Latest</th><th>Best</th><th>2nd Best</th>"), "{leaderboard}");
    assert!(leaderboard.contains("<tr><td>Model Rank</td><td>1</td><td>1</td><td>1</td></tr>"), "{leaderboard}");
    assert!(report.steps[2].card.tab("Best Parameters").is_none());
}
