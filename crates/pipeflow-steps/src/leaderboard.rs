//! Leaderboard del experimento y tabla de trials de tuning.
//!
//! Ambas son enriquecimientos: sus errores salen como
//! `PipelineError::Enrichment` y el step de entrenamiento los degrada a un
//! `warn!` sin tocar el modelo.

use chrono::DateTime;
use indexmap::IndexMap;
use log::debug;
use pipeflow_core::card::{format_sig, render_table};
use pipeflow_core::metrics::{self, MetricDefinition};
use pipeflow_core::PipelineError;
use pipeflow_tracking::{tags, OrderBy, Run, RunFilter, TrackingStore};

/// Runs históricos que se consultan como máximo.
pub const MAX_HISTORY: usize = 100;

const VALIDATION: &str = "validation";

fn enrichment(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Enrichment(e.to_string())
}

/// Etiquetas de rango para los dos primeros históricos y para el run actual.
///
/// `history` viene ordenado de mejor a peor. El segundo comparte el rango
/// "1" si su valor es igual al del primero; empates más allá de la posición
/// 2 no se igualan. El run actual ocupa la primera posición cuyo valor no
/// supera al suyo, o `"> n"` si es peor que todos.
pub fn rank_labels(history: &[f64], latest: f64, greater_is_better: bool) -> (String, Vec<String>) {
    let mut top = Vec::new();
    if let Some(first) = history.first() {
        top.push("1".to_string());
        if let Some(second) = history.get(1) {
            top.push(if second == first { "1" } else { "2" }.to_string());
        }
    }
    let at_least_as_good = |h: f64| if greater_is_better { latest >= h } else { latest <= h };
    let latest_rank = history.iter()
                             .position(|h| at_least_as_good(*h))
                             .map(|i| (i + 1).to_string())
                             .unwrap_or_else(|| format!("> {}", history.len()));
    (latest_rank, top)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardColumn {
    pub label: String,
    pub rank: String,
    pub metrics: IndexMap<String, f64>,
    pub start_time: i64,
    pub run_id: String,
}

/// Tabla transpuesta: filas = rango, métricas, hora, run id; columnas =
/// Latest, Best, 2nd Best.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub metric_names: Vec<String>,
    pub columns: Vec<LeaderboardColumn>,
    /// Runs históricos considerados tras filtrar.
    pub history_len: usize,
}

fn format_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis).map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                                           .unwrap_or_else(|| millis.to_string())
}

impl Leaderboard {
    pub fn to_html(&self) -> String {
        let mut headers = vec![String::new()];
        headers.extend(self.columns.iter().map(|c| c.label.clone()));

        let mut rows = Vec::with_capacity(self.metric_names.len() + 3);
        let row = |label: &str, f: &dyn Fn(&LeaderboardColumn) -> String| {
            let mut r = vec![label.to_string()];
            r.extend(self.columns.iter().map(f));
            r
        };
        rows.push(row("Model Rank", &|c| c.rank.clone()));
        for name in &self.metric_names {
            rows.push(row(name, &|c| c.metrics.get(name).map(|v| format_sig(*v, 6)).unwrap_or_default()));
        }
        rows.push(row("Run Time", &|c| format_time(c.start_time)));
        rows.push(row("Run ID", &|c| c.run_id.clone()));
        render_table(&headers, &rows)
    }
}

fn validation_values(run: &Run, names: &[String]) -> Option<IndexMap<String, f64>> {
    let logged = run.data_or_empty().metric_values();
    names.iter()
         .map(|n| logged.get(&metrics::tracking_key(n, VALIDATION)).map(|v| (n.clone(), *v)))
         .collect()
}

/// Construye el leaderboard del run `current_run_id` contra los
/// `MAX_HISTORY` mejores runs activos del experimento. Sólo cuentan runs que
/// reportan todas las métricas en validación. El run actual ya tiene sus
/// métricas registradas, así que aparece en su propio histórico.
pub fn build_leaderboard(store: &dyn TrackingStore,
                         experiment_id: &str,
                         current_run_id: &str,
                         current_start_time: i64,
                         latest: &IndexMap<String, f64>,
                         metric_defs: &[MetricDefinition],
                         primary: &str)
                         -> Result<Leaderboard, PipelineError> {
    let primary_def = metrics::find(metric_defs, primary).ok_or_else(|| enrichment(format!("unknown primary metric '{primary}'")))?;
    let metric_names = metrics::display_order(primary, metric_defs);
    let latest_primary = *latest.get(primary)
                                .ok_or_else(|| enrichment(format!("current run has no validation value for '{primary}'")))?;

    let order = OrderBy::metric(metrics::tracking_key(primary, VALIDATION), !primary_def.greater_is_better);
    let runs = store.search_runs(&[experiment_id.to_string()], &RunFilter::active(), Some(&order), MAX_HISTORY)
                    .map_err(enrichment)?;
    let history: Vec<(Run, IndexMap<String, f64>)> =
        runs.into_iter()
            .filter_map(|r| validation_values(&r, &metric_names).map(|v| (r, v)))
            .collect();
    debug!("leaderboard: {} comparable historical runs", history.len());

    let primary_history: Vec<f64> = history.iter().map(|(_, v)| v[primary]).collect();
    let (latest_rank, top_ranks) = rank_labels(&primary_history, latest_primary, primary_def.greater_is_better);

    let mut columns = vec![LeaderboardColumn { label: "Latest".to_string(),
                                               rank: latest_rank,
                                               metrics: metric_names.iter()
                                                                    .filter_map(|n| latest.get(n).map(|v| (n.clone(), *v)))
                                                                    .collect(),
                                               start_time: current_start_time,
                                               run_id: current_run_id.to_string() }];
    for ((label, rank), (run, values)) in ["Best", "2nd Best"].iter().zip(top_ranks).zip(history.iter()) {
        columns.push(LeaderboardColumn { label: label.to_string(),
                                         rank,
                                         metrics: values.clone(),
                                         start_time: run.info.start_time,
                                         run_id: run.info.run_id.clone() });
    }
    Ok(Leaderboard { metric_names, columns, history_len: history.len() })
}

/// Tabla HTML con los runs hijos (trials) de `parent_run_id`: run id, métrica
/// primaria en validación y cada parámetro afinado.
pub fn build_tuning_table(store: &dyn TrackingStore,
                          experiment_id: &str,
                          parent_run_id: &str,
                          primary: &MetricDefinition,
                          tuned_params: &[String])
                          -> Result<String, PipelineError> {
    let key = metrics::tracking_key(&primary.name, VALIDATION);
    let filter = RunFilter::active().with_tag(tags::PARENT_RUN_ID, parent_run_id);
    let order = OrderBy::metric(key.clone(), !primary.greater_is_better);
    let runs = store.search_runs(&[experiment_id.to_string()], &filter, Some(&order), usize::MAX)
                    .map_err(enrichment)?;
    if runs.is_empty() {
        return Err(enrichment(format!("no tuning runs found under run {parent_run_id}")));
    }

    let mut headers = vec!["Run ID".to_string(), key.clone()];
    headers.extend(tuned_params.iter().map(|p| format!("params.{p}")));
    let rows: Vec<Vec<String>> = runs.iter()
                                     .map(|run| {
                                         let data = run.data_or_empty();
                                         let metric_values = data.metric_values();
                                         let params = data.param_values();
                                         let mut row = vec![run.info.run_id.clone(),
                                                            metric_values.get(&key).map(|v| format_sig(*v, 6)).unwrap_or_default()];
                                         row.extend(tuned_params.iter().map(|p| params.get(p).cloned().unwrap_or_default()));
                                         row
                                     })
                                     .collect();
    Ok(render_table(&headers, &rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_tracking::{InMemoryTrackingStore, Metric};

    const RMSE: &str = "root_mean_squared_error";

    fn rmse_only() -> Vec<MetricDefinition> {
        metrics::builtin_metrics().into_iter().filter(|m| m.name == RMSE).collect()
    }

    fn logged_run(store: &InMemoryTrackingStore, exp: &str, rmse: f64) -> String {
        let info = store.create_run(exp, None, &[]).unwrap();
        store.log_metric(&info.run_id,
                         Metric { key: metrics::tracking_key(RMSE, VALIDATION), value: rmse, timestamp: 0, step: 0 })
             .unwrap();
        info.run_id
    }

    fn latest(rmse: f64) -> IndexMap<String, f64> {
        [(RMSE.to_string(), rmse)].into_iter().collect()
    }

    #[test]
    fn first_run_is_listed_as_best() {
        let store = InMemoryTrackingStore::new();
        let exp = store.get_or_create_experiment("exp").unwrap();
        let current = logged_run(&store, &exp, 2.0);

        let lb = build_leaderboard(&store, &exp, &current, 0, &latest(2.0), &rmse_only(), RMSE).unwrap();
        assert_eq!(lb.history_len, 1);
        let labels: Vec<&str> = lb.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Latest", "Best"]);
        assert_eq!(lb.columns[0].rank, "1");
        assert_eq!(lb.columns[1].rank, "1");
        assert_eq!(lb.columns[1].run_id, current);
    }

    #[test]
    fn current_run_ranks_inside_saved_history() {
        let store = InMemoryTrackingStore::new();
        let exp = store.get_or_create_experiment("exp").unwrap();
        let best = logged_run(&store, &exp, 1.0);
        logged_run(&store, &exp, 3.0);
        store.create_run(&exp, Some("no-metrics"), &[]).unwrap();
        let current = logged_run(&store, &exp, 2.0);

        let lb = build_leaderboard(&store, &exp, &current, 0, &latest(2.0), &rmse_only(), RMSE).unwrap();
        assert_eq!(lb.history_len, 3);
        assert_eq!(lb.columns[0].rank, "2");
        assert_eq!(lb.columns[1].run_id, best);
        assert_eq!(lb.columns[2].label, "2nd Best");
        assert_eq!(lb.columns[2].run_id, current);
        assert_eq!(lb.columns[2].rank, "2");
        assert!(lb.to_html().contains("<tr><td>Model Rank</td><td>2</td><td>1</td><td>2</td></tr>"));
    }

    #[test]
    fn tie_at_top_shares_rank_one() {
        let (latest, top) = rank_labels(&[0.5, 0.5, 0.7], 0.6, false);
        assert_eq!(top, vec!["1", "1"]);
        assert_eq!(latest, "3");
    }

    #[test]
    fn third_place_tie_is_not_equalized() {
        let (_, top) = rank_labels(&[0.1, 0.2, 0.2], 0.0, false);
        assert_eq!(top, vec!["1", "2"]);
    }

    #[test]
    fn latest_rank_respects_direction() {
        assert_eq!(rank_labels(&[0.9, 0.8], 0.95, true).0, "1");
        assert_eq!(rank_labels(&[0.9, 0.8], 0.8, true).0, "2");
        assert_eq!(rank_labels(&[0.9, 0.8], 0.1, true).0, "> 2");
        assert_eq!(rank_labels(&[], 0.1, true).0, "> 0");
    }
}
