//! Servicio de tracking como store key-value append-only.
//!
//! El trait `TrackingStore` es el contrato que consumen los steps; hay dos
//! implementaciones: `InMemoryTrackingStore` (tests / ejecuciones efímeras) y
//! `FileTrackingStore` (persistencia local en formato wire).

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::entities::{Metric, Param, Run, RunData, RunInfo, RunInputs, RunStatus, RunTag};
use crate::error::TrackingError;

pub const LIFECYCLE_ACTIVE: &str = "active";

/// Filtro de búsqueda de runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    /// Sólo runs cuyo tag `key` tenga exactamente `value`.
    pub tag_equals: Option<(String, String)>,
    /// Excluye runs en estado borrado.
    pub active_only: bool,
}

impl RunFilter {
    pub fn active() -> Self {
        Self { tag_equals: None, active_only: true }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_equals = Some((key.into(), value.into()));
        self
    }

    pub fn matches(&self, run: &Run) -> bool {
        if self.active_only && run.info.lifecycle_stage != LIFECYCLE_ACTIVE {
            return false;
        }
        match &self.tag_equals {
            Some((k, v)) => run.data.as_ref().and_then(|d| d.tag(k)) == Some(v.as_str()),
            None => true,
        }
    }
}

/// Orden por una métrica; los runs sin la métrica quedan al final.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub metric: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn metric(metric: impl Into<String>, ascending: bool) -> Self {
        Self { metric: metric.into(), ascending }
    }
}

/// Contrato del servicio de tracking.
pub trait TrackingStore: Send + Sync {
    /// Devuelve el id del experimento, creándolo si no existe.
    fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError>;

    fn create_run(&self, experiment_id: &str, run_name: Option<&str>, tags: &[RunTag]) -> Result<RunInfo, TrackingError>;

    fn log_metric(&self, run_id: &str, metric: Metric) -> Result<(), TrackingError>;

    /// Los params son inmutables: re-loguear con otro valor es `ParamConflict`.
    fn log_param(&self, run_id: &str, param: Param) -> Result<(), TrackingError>;

    fn set_tag(&self, run_id: &str, tag: RunTag) -> Result<(), TrackingError>;

    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, TrackingError>;

    fn get_run(&self, run_id: &str) -> Result<Run, TrackingError>;

    fn search_runs(&self,
                   experiment_ids: &[String],
                   filter: &RunFilter,
                   order_by: Option<&OrderBy>,
                   max_results: usize)
                   -> Result<Vec<Run>, TrackingError>;

    /// Registra un archivo local como artifact del run.
    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<PathBuf, TrackingError>;
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn new_run(experiment_id: &str, run_name: Option<&str>, tags: &[RunTag], artifact_root: &str) -> Run {
    let run_id = Uuid::new_v4().simple().to_string();
    let run_name = run_name.map(str::to_string).unwrap_or_else(|| format!("run-{}", &run_id[..8]));
    let mut tags = tags.to_vec();
    if !tags.iter().any(|t| t.key == crate::tags::RUN_NAME) {
        tags.push(RunTag::new(crate::tags::RUN_NAME, run_name.clone()));
    }
    let info = RunInfo { artifact_uri: format!("{artifact_root}/{experiment_id}/{run_id}/artifacts"),
                         run_id,
                         run_name,
                         experiment_id: experiment_id.to_string(),
                         user_id: whoami(),
                         status: RunStatus::Running,
                         start_time: now_millis(),
                         end_time: None,
                         lifecycle_stage: LIFECYCLE_ACTIVE.to_string() };
    Run::new(info, Some(RunData { tags, ..Default::default() }), Some(RunInputs::default()))
}

fn whoami() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "unknown".into())
}

/// Aplica el param respetando la inmutabilidad.
pub(crate) fn apply_param(run: &mut Run, param: Param) -> Result<(), TrackingError> {
    let data = run.data.get_or_insert_with(RunData::default);
    if let Some(existing) = data.params.iter().find(|p| p.key == param.key) {
        if existing.value != param.value {
            return Err(TrackingError::ParamConflict { key: param.key,
                                                      existing: existing.value.clone(),
                                                      new: param.value });
        }
        return Ok(());
    }
    data.params.push(param);
    Ok(())
}

pub(crate) fn apply_tag(run: &mut Run, tag: RunTag) {
    let data = run.data.get_or_insert_with(RunData::default);
    data.tags.retain(|t| t.key != tag.key);
    data.tags.push(tag);
}

pub(crate) fn apply_status(run: &mut Run, status: RunStatus, end_time: Option<i64>) -> Result<(), TrackingError> {
    if run.info.status.is_terminal() && status == RunStatus::Running {
        return Err(TrackingError::InvalidState(format!("run {} already {}", run.info.run_id, run.info.status.as_str())));
    }
    run.info.status = status;
    run.info.end_time = end_time.or(run.info.end_time);
    Ok(())
}

/// Filtra, ordena y trunca. Orden secundario: `start_time` descendente y
/// luego `run_id` para que el resultado sea estable.
pub(crate) fn select_runs(mut runs: Vec<Run>,
                          experiment_ids: &[String],
                          filter: &RunFilter,
                          order_by: Option<&OrderBy>,
                          max_results: usize)
                          -> Vec<Run> {
    runs.retain(|r| experiment_ids.iter().any(|e| *e == r.info.experiment_id) && filter.matches(r));
    runs.sort_by(|a, b| {
            let primary = match order_by {
                Some(order) => {
                    let va = a.data.as_ref().and_then(|d| d.metric_values().get(&order.metric).copied());
                    let vb = b.data.as_ref().and_then(|d| d.metric_values().get(&order.metric).copied());
                    compare_metric(va, vb, order.ascending)
                }
                None => Ordering::Equal,
            };
            primary.then_with(|| b.info.start_time.cmp(&a.info.start_time))
                   .then_with(|| a.info.run_id.cmp(&b.info.run_id))
        });
    runs.truncate(max_results);
    runs
}

fn compare_metric(a: Option<f64>, b: Option<f64>, ascending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if ascending { ord } else { ord.reverse() }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Store en memoria, seguro para escritores concurrentes (trials en paralelo).
#[derive(Debug, Default)]
pub struct InMemoryTrackingStore {
    experiments: DashMap<String, String>,
    runs: DashMap<String, Run>,
    artifacts: DashMap<String, Vec<PathBuf>>,
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta un run ya construido (útil para sembrar historial en tests).
    pub fn insert_run(&self, run: Run) {
        self.runs.insert(run.info.run_id.clone(), run);
    }

    pub fn artifacts_of(&self, run_id: &str) -> Vec<PathBuf> {
        self.artifacts.get(run_id).map(|a| a.clone()).unwrap_or_default()
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut Run) -> Result<T, TrackingError>) -> Result<T, TrackingError> {
        let mut entry = self.runs.get_mut(run_id).ok_or_else(|| TrackingError::NotFound(run_id.to_string()))?;
        f(entry.value_mut())
    }
}

impl TrackingStore for InMemoryTrackingStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let next_id = self.experiments.len().to_string();
        Ok(self.experiments.entry(name.to_string()).or_insert(next_id).value().clone())
    }

    fn create_run(&self, experiment_id: &str, run_name: Option<&str>, tags: &[RunTag]) -> Result<RunInfo, TrackingError> {
        let run = new_run(experiment_id, run_name, tags, "memory://");
        let info = run.info.clone();
        self.runs.insert(info.run_id.clone(), run);
        Ok(info)
    }

    fn log_metric(&self, run_id: &str, metric: Metric) -> Result<(), TrackingError> {
        self.with_run(run_id, |run| {
                run.data.get_or_insert_with(RunData::default).metrics.push(metric);
                Ok(())
            })
    }

    fn log_param(&self, run_id: &str, param: Param) -> Result<(), TrackingError> {
        self.with_run(run_id, |run| apply_param(run, param))
    }

    fn set_tag(&self, run_id: &str, tag: RunTag) -> Result<(), TrackingError> {
        self.with_run(run_id, |run| {
                apply_tag(run, tag);
                Ok(())
            })
    }

    fn update_run(&self, run_id: &str, status: RunStatus, end_time: Option<i64>) -> Result<RunInfo, TrackingError> {
        self.with_run(run_id, |run| {
                apply_status(run, status, end_time)?;
                Ok(run.info.clone())
            })
    }

    fn get_run(&self, run_id: &str) -> Result<Run, TrackingError> {
        self.runs.get(run_id).map(|r| r.clone()).ok_or_else(|| TrackingError::NotFound(run_id.to_string()))
    }

    fn search_runs(&self,
                   experiment_ids: &[String],
                   filter: &RunFilter,
                   order_by: Option<&OrderBy>,
                   max_results: usize)
                   -> Result<Vec<Run>, TrackingError> {
        let runs: Vec<Run> = self.runs.iter().map(|r| r.value().clone()).collect();
        Ok(select_runs(runs, experiment_ids, filter, order_by, max_results))
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<PathBuf, TrackingError> {
        if !self.runs.contains_key(run_id) {
            return Err(TrackingError::NotFound(run_id.to_string()));
        }
        self.artifacts.entry(run_id.to_string()).or_default().push(local_path.to_path_buf());
        Ok(local_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(key: &str, value: f64) -> Metric {
        Metric { key: key.into(), value, timestamp: now_millis(), step: 0 }
    }

    #[test]
    fn param_conflict_is_reported() {
        let store = InMemoryTrackingStore::new();
        let exp = store.get_or_create_experiment("exp").unwrap();
        let run = store.create_run(&exp, None, &[]).unwrap();
        store.log_param(&run.run_id, Param { key: "alpha".into(), value: "0.1".into() }).unwrap();
        store.log_param(&run.run_id, Param { key: "alpha".into(), value: "0.1".into() }).unwrap();
        let err = store.log_param(&run.run_id, Param { key: "alpha".into(), value: "0.2".into() });
        assert!(matches!(err, Err(TrackingError::ParamConflict { .. })));
    }

    #[test]
    fn search_orders_by_metric_and_puts_missing_last() {
        let store = InMemoryTrackingStore::new();
        let exp = store.get_or_create_experiment("exp").unwrap();
        let a = store.create_run(&exp, Some("a"), &[]).unwrap();
        let b = store.create_run(&exp, Some("b"), &[]).unwrap();
        store.create_run(&exp, Some("c"), &[]).unwrap();
        store.log_metric(&a.run_id, metric("rmse", 3.0)).unwrap();
        store.log_metric(&b.run_id, metric("rmse", 1.0)).unwrap();

        let order = OrderBy::metric("rmse", true);
        let found = store.search_runs(&[exp.clone()], &RunFilter::active(), Some(&order), 10).unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.info.run_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);

        let limited = store.search_runs(&[exp], &RunFilter::active(), Some(&order), 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn experiments_get_stable_ids() {
        let store = InMemoryTrackingStore::new();
        let first = store.get_or_create_experiment("a").unwrap();
        let second = store.get_or_create_experiment("b").unwrap();
        assert_ne!(first, second);
        assert_eq!(store.get_or_create_experiment("a").unwrap(), first);
    }

    #[test]
    fn finished_run_cannot_be_restarted() {
        let store = InMemoryTrackingStore::new();
        let exp = store.get_or_create_experiment("exp").unwrap();
        let run = store.create_run(&exp, None, &[]).unwrap();
        store.update_run(&run.run_id, RunStatus::Finished, Some(now_millis())).unwrap();
        assert!(store.update_run(&run.run_id, RunStatus::Running, None).is_err());
    }
}
