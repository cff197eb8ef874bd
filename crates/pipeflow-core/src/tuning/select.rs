//! Selección final de hiperparámetros y su volcado a YAML.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::search::SearchResult;
use crate::capability::Params;
use crate::errors::PipelineError;

pub const BEST_PARAMETERS_FILE: &str = "best_parameters.yaml";

#[derive(Debug, Clone, PartialEq)]
pub struct BestParameters {
    /// Parámetros muestreados que ganaron (vacío si ganó la configuración fija).
    pub tuned: Params,
    /// Parámetros fijos no sobrescritos por `tuned`.
    pub hardcoded: Params,
    /// Conjunto final con el que se entrena.
    pub combined: Params,
    pub best_trial_loss: Option<f64>,
    pub hardcoded_loss: Option<f64>,
}

/// Se queda con la mejor muestra sólo si su pérdida es estrictamente menor
/// que la de la configuración fija. Una evaluación fija fallida cuenta como
/// `+inf`; si todo falló, el tuning falla.
pub fn select_best_params(result: &SearchResult,
                          hardcoded: &Params,
                          hardcoded_loss: Option<f64>)
                          -> Result<BestParameters, PipelineError> {
    let best = result.best();
    if best.is_none() && hardcoded_loss.is_none() {
        return Err(PipelineError::Trial(format!("all {} tuning trials and the hardcoded configuration failed", result.trials.len())));
    }
    let best_trial_loss = best.and_then(|b| b.loss);
    let tuned_wins = match (best_trial_loss, hardcoded_loss) {
        (Some(b), Some(h)) => b < h,
        (Some(_), None) => true,
        (None, _) => false,
    };
    let selection = if let (true, Some(best)) = (tuned_wins, best) {
        let tuned = best.params.clone();
        let remaining: Params = hardcoded.iter()
                                         .filter(|(k, _)| !tuned.contains_key(*k))
                                         .map(|(k, v)| (k.clone(), v.clone()))
                                         .collect();
        let mut combined = hardcoded.clone();
        for (k, v) in &tuned {
            combined.insert(k.clone(), v.clone());
        }
        BestParameters { tuned, hardcoded: remaining, combined, best_trial_loss, hardcoded_loss }
    } else {
        BestParameters { tuned: Params::new(),
                         hardcoded: hardcoded.clone(),
                         combined: hardcoded.clone(),
                         best_trial_loss,
                         hardcoded_loss }
    };
    info!("tuning selected {} parameters (best trial loss {:?}, hardcoded loss {:?})",
          if selection.used_tuned() { "tuned" } else { "hardcoded" },
          best_trial_loss,
          hardcoded_loss);
    Ok(selection)
}

fn dump(params: &Params) -> Result<String, PipelineError> {
    if params.is_empty() {
        return Ok(String::new());
    }
    let mut mapping = serde_yaml::Mapping::new();
    for (k, v) in params {
        mapping.insert(serde_yaml::Value::String(k.clone()), v.to_yaml());
    }
    Ok(serde_yaml::to_string(&mapping)?)
}

impl BestParameters {
    pub fn used_tuned(&self) -> bool {
        !self.tuned.is_empty()
    }

    /// Dos grupos comentados: tuned y hardcoded.
    pub fn to_yaml(&self) -> Result<String, PipelineError> {
        Ok(format!("# tuned hyperparameters\n{}# hardcoded parameters\n{}", dump(&self.tuned)?, dump(&self.hardcoded)?))
    }

    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, PipelineError> {
        let path = output_dir.join(BEST_PARAMETERS_FILE);
        fs::write(&path, self.to_yaml()?)?;
        Ok(path)
    }
}
