//! Secciones de configuración por step.

use serde_json::Value;

use super::PipelineConfig;
use crate::capability::{params_from_json, Params};
use crate::constants::{DEFAULT_SPLIT_RATIOS, DEFAULT_TUNING_ALGORITHM, DEFAULT_TUNING_SEED};
use crate::errors::PipelineError;
use crate::tuning::SearchSpace;

const SUPPORTED_TRAIN_USING: &[&str] = &["estimator_spec"];

fn get_bool(section: &Value, key: &str, default: bool) -> Result<bool, PipelineError> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(PipelineError::config(format!("'{key}' must be a boolean, got {other}"))),
    }
}

fn get_str<'a>(section: &'a Value, key: &str) -> Result<Option<&'a str>, PipelineError> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(PipelineError::config(format!("'{key}' must be a string, got {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitConfig {
    /// CSV relativo a la raíz del pipeline.
    pub source: String,
    pub split_ratios: [f64; 3],
}

impl SplitConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let section = config.step_section("split")
                            .ok_or_else(|| PipelineError::config("Config for split step is not found."))?;
        let source = get_str(section, "source")?.ok_or_else(|| PipelineError::config("Missing 'source' configuration in the split step."))?
                                                  .to_string();
        let split_ratios = match section.get("split_ratios") {
            None | Some(Value::Null) => DEFAULT_SPLIT_RATIOS,
            Some(v) => {
                let ratios: Vec<f64> = serde_json::from_value(v.clone()).map_err(|e| {
                                                                             PipelineError::config(format!("'split_ratios' must be a list of numbers: {e}"))
                                                                         })?;
                let ratios: [f64; 3] = ratios.try_into().map_err(|_| {
                                                             PipelineError::config("'split_ratios' must contain exactly three fractions")
                                                         })?;
                ratios
            }
        };
        if split_ratios.iter().any(|r| *r < 0.0) || (split_ratios.iter().sum::<f64>() - 1.0).abs() > 1e-6 {
            return Err(PipelineError::config(format!("'split_ratios' must be non-negative and sum to 1, got {split_ratios:?}")));
        }
        Ok(Self { source, split_ratios })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformConfig {
    /// `None` usa el transformador identidad.
    pub transformer_method: Option<String>,
    pub skip_data_profiling: bool,
}

impl TransformConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let Some(section) = config.step_section("transform") else {
            return Ok(Self::default());
        };
        Ok(Self { transformer_method: get_str(section, "transformer_method")?.map(str::to_string),
                  skip_data_profiling: get_bool(section, "skip_data_profiling", false)? })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningConfig {
    pub max_trials: usize,
    pub space: SearchSpace,
    pub algorithm: String,
    pub parallelism: usize,
    pub sample_fraction: f64,
    pub seed: u64,
}

impl TuningConfig {
    /// `Ok(None)` cuando el tuning está deshabilitado.
    fn from_section(section: &Value) -> Result<Option<Self>, PipelineError> {
        let enabled = match section.get("enabled") {
            Some(Value::Bool(b)) => *b,
            _ => {
                return Err(PipelineError::config("The 'tuning' configuration in the train step must include an 'enabled' key set to true or false."))
            }
        };
        if !enabled {
            return Ok(None);
        }
        let max_trials = section.get("max_trials")
                                .and_then(Value::as_u64)
                                .filter(|n| *n > 0)
                                .ok_or_else(|| PipelineError::config("The 'max_trials' configuration in the train step must be provided and positive when tuning is enabled."))?
                                as usize;
        let parameters = section.get("parameters")
                                .filter(|p| p.is_object())
                                .ok_or_else(|| PipelineError::config("The 'parameters' configuration in the train step must be provided when tuning is enabled."))?;
        let space = SearchSpace::from_json(parameters)?;
        let algorithm = get_str(section, "algorithm")?.unwrap_or(DEFAULT_TUNING_ALGORITHM).to_string();
        let parallelism = match section.get("parallelism") {
            None | Some(Value::Null) => 1,
            Some(v) => v.as_u64()
                        .filter(|n| *n >= 1)
                        .ok_or_else(|| PipelineError::config(format!("'parallelism' must be an integer >= 1, got {v}")))?
                        as usize,
        };
        let sample_fraction = match section.get("sample_fraction") {
            None | Some(Value::Null) => 1.0,
            Some(v) => v.as_f64()
                        .filter(|f| *f > 0.0 && *f <= 1.0)
                        .ok_or_else(|| PipelineError::config("The 'sample_fraction' configuration in the train step must be between 0 and 1."))?,
        };
        let seed = match section.get("seed") {
            None | Some(Value::Null) => DEFAULT_TUNING_SEED,
            Some(v) => v.as_u64().ok_or_else(|| PipelineError::config(format!("'seed' must be a non-negative integer, got {v}")))?,
        };
        Ok(Some(Self { max_trials, space, algorithm, parallelism, sample_fraction, seed }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub estimator_method: String,
    pub estimator_params: Params,
    pub skip_data_profiling: bool,
    pub tuning: Option<TuningConfig>,
}

impl TrainConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let section = config.step_section("train")
                            .ok_or_else(|| PipelineError::config("Config for train step is not found."))?;
        let using = get_str(section, "using")?.unwrap_or("estimator_spec");
        if !SUPPORTED_TRAIN_USING.contains(&using) {
            return Err(PipelineError::config(format!("Invalid train step configuration value {using} for key 'using'. Supported values are: {SUPPORTED_TRAIN_USING:?}")));
        }
        let estimator_method = get_str(section, "estimator_method")?.ok_or_else(|| {
                                                                        PipelineError::config("Missing 'estimator_method' configuration in the train step.")
                                                                    })?
                                                                    .to_string();
        let estimator_params = params_from_json(section.get("estimator_params").unwrap_or(&Value::Null))?;
        let tuning = match section.get("tuning") {
            None | Some(Value::Null) => None,
            Some(t) => TuningConfig::from_section(t)?,
        };
        Ok(Self { estimator_method,
                  estimator_params,
                  skip_data_profiling: get_bool(section, "skip_data_profiling", false)?,
                  tuning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(steps: Value) -> PipelineConfig {
        PipelineConfig::from_value(json!({"target_col": "y", "steps": steps}), "local", "demo").unwrap()
    }

    fn config_message(err: PipelineError) -> String {
        match err {
            PipelineError::Config(m) => m,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_train_section() {
        let err = TrainConfig::from_pipeline(&pipeline(json!({}))).unwrap_err();
        assert_eq!(config_message(err), "Config for train step is not found.");
    }

    #[test]
    fn invalid_using_lists_supported_values() {
        let err = TrainConfig::from_pipeline(&pipeline(json!({"train": {"using": "automl", "estimator_method": "a.b"}}))).unwrap_err();
        assert!(config_message(err).contains("estimator_spec"));
    }

    #[test]
    fn tuning_requires_enabled_and_fields() {
        let no_enabled = pipeline(json!({"train": {"estimator_method": "a.b", "tuning": {"max_trials": 3}}}));
        assert!(config_message(TrainConfig::from_pipeline(&no_enabled).unwrap_err()).contains("'enabled'"));

        let no_params = pipeline(json!({"train": {"estimator_method": "a.b", "tuning": {"enabled": true, "max_trials": 3}}}));
        assert!(config_message(TrainConfig::from_pipeline(&no_params).unwrap_err()).contains("'parameters'"));

        let disabled = pipeline(json!({"train": {"estimator_method": "a.b", "tuning": {"enabled": false}}}));
        assert_eq!(TrainConfig::from_pipeline(&disabled).unwrap().tuning, None);
    }

    #[test]
    fn tuning_defaults() {
        let cfg = pipeline(json!({"train": {
            "estimator_method": "a.b",
            "estimator_params": {"alpha": 1.0},
            "tuning": {"enabled": true, "max_trials": 4, "parameters": {"alpha": {"distribution": "uniform", "low": 0.0, "high": 1.0}}}
        }}));
        let train = TrainConfig::from_pipeline(&cfg).unwrap();
        let tuning = train.tuning.unwrap();
        assert_eq!(tuning.parallelism, 1);
        assert_eq!(tuning.sample_fraction, 1.0);
        assert_eq!(tuning.seed, DEFAULT_TUNING_SEED);
        assert_eq!(tuning.algorithm, DEFAULT_TUNING_ALGORITHM);
    }

    #[test]
    fn sample_fraction_bounds() {
        let cfg = pipeline(json!({"train": {"estimator_method": "a.b",
            "tuning": {"enabled": true, "max_trials": 1, "sample_fraction": 1.5,
                       "parameters": {"alpha": {"values": [1, 2]}}}}}));
        assert!(config_message(TrainConfig::from_pipeline(&cfg).unwrap_err()).contains("sample_fraction"));
    }

    #[test]
    fn split_ratios_validated() {
        let ok = pipeline(json!({"split": {"source": "data.csv"}}));
        assert_eq!(SplitConfig::from_pipeline(&ok).unwrap().split_ratios, DEFAULT_SPLIT_RATIOS);
        let bad = pipeline(json!({"split": {"source": "data.csv", "split_ratios": [0.5, 0.6, -0.1]}}));
        assert!(SplitConfig::from_pipeline(&bad).is_err());
        let missing = pipeline(json!({"split": {}}));
        assert!(SplitConfig::from_pipeline(&missing).is_err());
    }
}
