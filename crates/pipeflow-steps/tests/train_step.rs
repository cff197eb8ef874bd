mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use pipeflow_core::metrics::{resolve_metrics, tracking_key};
use pipeflow_core::{PipelineEngine, PipelineError, StepContext};
use pipeflow_steps::builtins::{KNN_REGRESSOR, LINEAR_REGRESSION};
use pipeflow_steps::{build_leaderboard, builtin_components, TrainStep};
use pipeflow_tracking::{InMemoryTrackingStore, Metric, OrderBy, Param, Run, RunFilter, RunHandle, RunInfo, RunStatus, RunTag,
                        TrackingError, TrackingStore};
use serde_json::json;

/// Store que delega todo salvo la búsqueda, que siempre falla.
struct SearchlessStore {
    inner: InMemoryTrackingStore,
}

impl TrackingStore for SearchlessStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        self.inner.get_or_create_experiment(name)
    }

    fn create_run(&self, experiment_id: &str, run_name: Option<&str>, tags: &[RunTag]) -> Result<RunInfo, TrackingError> {
        self.inner.create_run(experiment_id, run_name, tags)
    }

    fn log_metric(&self, run_id: &str, metric: Metric) -> Result<(), TrackingError> {
        self.inner.log_metric(run_id, metric)
    }

    fn log_param(&self, run_id: &str, param: Param) -> Result<(), TrackingError> {
        self.inner.log_param(run_id, param)
    }

    fn set_tag(&self, run_id: &str, tag: RunTag) -> Result<(), TrackingError> {
        self.inner.set_tag(run_id, tag)
    }

    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, TrackingError> {
        self.inner.update_run(run_id, status, end_time)
    }

    fn get_run(&self, run_id: &str) -> Result<Run, TrackingError> {
        self.inner.get_run(run_id)
    }

    fn search_runs(&self,
                   _experiment_ids: &[String],
                   _filter: &RunFilter,
                   _order_by: Option<&OrderBy>,
                   _max_results: usize)
                   -> Result<Vec<Run>, TrackingError> {
        Err(TrackingError::InvalidState("search is unavailable".into()))
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<PathBuf, TrackingError> {
        self.inner.log_artifact(run_id, local_path)
    }
}

fn train_config(tuning: bool) -> serde_json::Value {
    let mut train = json!({"estimator_method": KNN_REGRESSOR, "estimator_params": {"n_neighbors": 3}});
    if tuning {
        train["tuning"] = json!({"enabled": true, "max_trials": 2, "parameters": {"n_neighbors": {"values": [2, 4]}}});
    }
    json!({"target_col": "y", "steps": {"split": {"source": "data.csv"}, "train": train}})
}

#[test]
fn leaderboard_failure_keeps_model_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    common::write_dataset(dir.path(), 100);
    let config = common::config(train_config(true));
    let store: Arc<dyn TrackingStore> = Arc::new(SearchlessStore { inner: InMemoryTrackingStore::new() });
    let mut engine = common::engine(dir.path(), &config, &builtin_components(), store);

    let report = engine.run().unwrap();
    let card = &report.steps[2].card;
    let tabs = card.tab_names();
    assert_eq!(tabs[0], "Model Performance Summary Metrics");
    assert!(!tabs.contains(&"Leaderboard"));
    assert!(!tabs.contains(&"Tuning Trials"));
    assert!(tabs.contains(&"Best Parameters"));
    let metrics = card.tab("Model Performance Summary Metrics").unwrap().render();
    assert!(metrics.contains("root_mean_squared_error"));
    assert!(engine.context().locator.path("train", "model/model.json").is_file());
}

#[test]
fn train_without_upstream_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(train_config(false));
    let store = Arc::new(InMemoryTrackingStore::new());
    let ctx = StepContext::new(&config, dir.path(), store.clone()).unwrap();
    let mut engine = PipelineEngine::new(ctx).add_step(TrainStep::from_pipeline(&config, &builtin_components()).unwrap());

    let err = engine.run().unwrap_err();
    assert!(matches!(err, PipelineError::UpstreamMissing { ref step, .. } if step == "transform"), "{err}");
    let outputs = engine.context().locator.output_dir("train");
    assert_eq!(std::fs::read_dir(&outputs).map(|d| d.count()).unwrap_or(0), 0);
    let exp = vec![engine.context().experiment_id.clone()];
    assert!(store.search_runs(&exp, &RunFilter::default(), None, 10).unwrap().is_empty());
}

#[test]
fn unknown_primary_metric_is_rejected_at_construction() {
    let mut value = train_config(false);
    value["metrics"] = json!({"primary": "accuracy"});
    let err = TrainStep::from_pipeline(&common::config(value), &builtin_components()).unwrap_err();
    assert!(matches!(err, PipelineError::Config(ref m) if m.contains("accuracy")));
}

#[test]
fn tpe_is_reported_as_missing_dependency() {
    let mut value = train_config(true);
    value["steps"]["train"]["tuning"]["algorithm"] = json!("hyperopt.tpe.suggest");
    let err = TrainStep::from_pipeline(&common::config(value), &builtin_components()).unwrap_err();
    assert!(matches!(err, PipelineError::DependencyMissing(_)));
}

fn seed_run(store: &Arc<dyn TrackingStore>, exp: &str, values: &IndexMap<String, f64>) -> String {
    let run = RunHandle::begin(store.clone(), exp, None, &[]).unwrap();
    for (name, value) in values {
        run.log_metric(&tracking_key(name, "validation"), *value).unwrap();
    }
    let id = run.run_id().to_string();
    run.finish(RunStatus::Finished).unwrap();
    id
}

#[test]
fn equal_top_two_runs_share_rank_one() {
    let components = builtin_components();
    let defs = resolve_metrics("root_mean_squared_error", &[], &components).unwrap();
    let store: Arc<dyn TrackingStore> = Arc::new(InMemoryTrackingStore::new());
    let exp = store.get_or_create_experiment("leaderboard").unwrap();
    let values = |rmse: f64| -> IndexMap<String, f64> {
        defs.iter()
            .map(|m| (m.name.clone(), if m.name == "root_mean_squared_error" { rmse } else { 1.0 }))
            .collect()
    };

    seed_run(&store, &exp, &values(0.5));
    seed_run(&store, &exp, &values(0.5));
    seed_run(&store, &exp, &values(0.9));
    // Sin todas las métricas: no entra al histórico.
    let mut partial = IndexMap::new();
    partial.insert("root_mean_squared_error".to_string(), 0.1);
    seed_run(&store, &exp, &partial);

    let leaderboard = build_leaderboard(store.as_ref(), &exp, "current", 0, &values(0.7), &defs, "root_mean_squared_error").unwrap();
    assert_eq!(leaderboard.history_len, 3);
    let ranks: Vec<&str> = leaderboard.columns.iter().map(|c| c.rank.as_str()).collect();
    assert_eq!(ranks, vec!["3", "1", "1"]);
    let labels: Vec<&str> = leaderboard.columns.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["Latest", "Best", "2nd Best"]);
    assert_eq!(leaderboard.metric_names[0], "root_mean_squared_error");
    assert!(leaderboard.to_html().contains("Run ID"));
}

#[test]
fn linear_model_fits_clean_data() {
    let dir = tempfile::tempdir().unwrap();
    common::write_dataset(dir.path(), 200);
    let config = common::config(json!({
        "target_col": "y",
        "metrics": {"primary": "r2_score"},
        "steps": {"split": {"source": "data.csv"}, "train": {"estimator_method": LINEAR_REGRESSION}}
    }));
    let store = Arc::new(InMemoryTrackingStore::new());
    let mut engine = common::engine(dir.path(), &config, &builtin_components(), store.clone());
    engine.run().unwrap();

    let run_id = std::fs::read_to_string(engine.context().locator.path("train", "run_id")).unwrap();
    let metrics = store.get_run(&run_id).unwrap().data_or_empty().metric_values();
    assert!(metrics["r2_score_on_data_validation"] > 0.99, "{metrics:?}");
}
