//! Bucle de búsqueda: evalúa `max_trials` muestras del espacio.
//!
//! La muestra del trial `i` se obtiene con semilla `seed + i`, así que el
//! resultado no depende del paralelismo. Con `parallelism > 1` los trials se
//! reparten en un pool de rayon; el objetivo sólo recibe referencias
//! compartidas, nunca copias de los datos.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::space::SearchSpace;
use crate::capability::Params;
use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAlgorithm {
    Random,
}

const UNAVAILABLE: &[&str] = &["hyperopt.tpe.suggest",
                               "tpe.suggest",
                               "hyperopt.anneal.suggest",
                               "anneal.suggest",
                               "hyperopt.atpe.suggest",
                               "atpe.suggest"];

impl SearchAlgorithm {
    pub fn resolve(name: &str) -> Result<Self, PipelineError> {
        match name {
            "hyperopt.rand.suggest" | "rand.suggest" | "random" => Ok(SearchAlgorithm::Random),
            n if UNAVAILABLE.contains(&n) => {
                Err(PipelineError::DependencyMissing(format!("tuning algorithm '{n}' needs a Bayesian optimization backend that is not \
                                                              installed; use 'hyperopt.rand.suggest'")))
            }
            other => Err(PipelineError::config(format!("unknown tuning algorithm '{other}'"))),
        }
    }
}

/// Resultado de evaluar el objetivo para una muestra.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    /// Pérdida firmada (siempre se minimiza).
    pub loss: f64,
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub index: usize,
    pub params: Params,
    /// `None` si el trial falló o la pérdida no es finita.
    pub loss: Option<f64>,
    pub run_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub trials: Vec<TrialRecord>,
}

impl SearchResult {
    /// Trial con menor pérdida; empate -> menor índice.
    pub fn best(&self) -> Option<&TrialRecord> {
        self.trials
            .iter()
            .filter(|t| t.loss.is_some())
            .min_by(|a, b| {
                let (la, lb) = (a.loss.unwrap_or(f64::INFINITY), b.loss.unwrap_or(f64::INFINITY));
                la.total_cmp(&lb).then(a.index.cmp(&b.index))
            })
    }

    pub fn failed(&self) -> usize {
        self.trials.iter().filter(|t| t.loss.is_none()).count()
    }
}

fn run_trial<F>(objective: &F, space: &SearchSpace, seed: u64, index: usize) -> TrialRecord
    where F: Fn(usize, &Params) -> Result<TrialOutcome, PipelineError> + Sync
{
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
    let params = space.sample(&mut rng);
    match objective(index, &params) {
        Ok(outcome) if outcome.loss.is_finite() => {
            debug!("trial {index} loss={} params={params:?}", outcome.loss);
            TrialRecord { index, params, loss: Some(outcome.loss), run_id: outcome.run_id, error: None }
        }
        Ok(outcome) => {
            warn!("trial {index} produced a non-finite loss ({}); discarding it", outcome.loss);
            TrialRecord { index,
                          params,
                          loss: None,
                          run_id: outcome.run_id,
                          error: Some(format!("non-finite loss {}", outcome.loss)) }
        }
        Err(e) => {
            warn!("trial {index} failed: {e}");
            TrialRecord { index, params, loss: None, run_id: None, error: Some(e.to_string()) }
        }
    }
}

/// Ejecuta la búsqueda. Los fallos de trial no abortan: quedan registrados
/// sin pérdida y no participan en la selección.
pub fn tune<F>(objective: &F,
               space: &SearchSpace,
               algorithm: SearchAlgorithm,
               max_trials: usize,
               parallelism: usize,
               seed: u64)
               -> Result<SearchResult, PipelineError>
    where F: Fn(usize, &Params) -> Result<TrialOutcome, PipelineError> + Sync
{
    debug!("tuning with {algorithm:?}: {max_trials} trials, parallelism {parallelism}, seed {seed}");
    let trials = if parallelism <= 1 {
        (0..max_trials).map(|i| run_trial(objective, space, seed, i)).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(parallelism)
                                                  .build()
                                                  .map_err(|e| PipelineError::Trial(format!("cannot start tuning workers: {e}")))?;
        pool.install(|| {
                (0..max_trials).into_par_iter()
                               .map(|i| run_trial(objective, space, seed, i))
                               .collect::<Vec<_>>()
            })
    };
    Ok(SearchResult { trials })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn space() -> SearchSpace {
        SearchSpace::from_json(&json!({"x": {"distribution": "uniform", "low": -2.0, "high": 2.0}})).unwrap()
    }

    #[test]
    fn unavailable_algorithms_are_dependency_errors() {
        assert_eq!(SearchAlgorithm::resolve("hyperopt.rand.suggest").unwrap(), SearchAlgorithm::Random);
        assert!(matches!(SearchAlgorithm::resolve("hyperopt.tpe.suggest"), Err(PipelineError::DependencyMissing(_))));
        assert!(matches!(SearchAlgorithm::resolve("grid"), Err(PipelineError::Config(_))));
    }

    #[test]
    fn parallel_search_matches_sequential() {
        let data = Arc::new(vec![0.5_f64; 1000]);
        let objective = {
            let data = Arc::clone(&data);
            move |_i: usize, p: &Params| -> Result<TrialOutcome, PipelineError> {
                let x = p["x"].as_f64().unwrap_or_default();
                Ok(TrialOutcome { loss: (x - data[0]).powi(2), run_id: None })
            }
        };
        let seq = tune(&objective, &space(), SearchAlgorithm::Random, 16, 1, 7).unwrap();
        let par = tune(&objective, &space(), SearchAlgorithm::Random, 16, 4, 7).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq.trials.len(), 16);
        // Una sola copia de los datos: la del test y la del closure comparten Arc.
        assert_eq!(Arc::strong_count(&data), 2);
    }

    #[test]
    fn failed_trials_are_excluded_from_best() {
        let objective = |i: usize, _p: &Params| {
            if i % 2 == 0 {
                Err(PipelineError::Estimator("diverged".into()))
            } else {
                Ok(TrialOutcome { loss: i as f64, run_id: None })
            }
        };
        let result = tune(&objective, &space(), SearchAlgorithm::Random, 6, 1, 0).unwrap();
        assert_eq!(result.failed(), 3);
        assert_eq!(result.best().unwrap().index, 1);
    }
}
