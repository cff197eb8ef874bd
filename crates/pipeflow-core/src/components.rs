//! Registro inyectado de componentes resolubles por nombre punteado.
//!
//! La configuración referencia estimadores, transformadores y métricas como
//! `modulo.simbolo`; los steps resuelven esos nombres una sola vez, al
//! construirse, contra este registro. Los loaders reconstruyen componentes
//! ajustados a partir de su `SavedComponent`.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::capability::{Estimator, Params, SavedComponent, Transformer};
use crate::errors::PipelineError;

pub type EstimatorFactory = Arc<dyn Fn(&Params) -> Result<Box<dyn Estimator>, PipelineError> + Send + Sync>;
pub type TransformerFactory = Arc<dyn Fn() -> Result<Box<dyn Transformer>, PipelineError> + Send + Sync>;
pub type EstimatorLoader = Arc<dyn Fn(&Value) -> Result<Box<dyn Estimator>, PipelineError> + Send + Sync>;
pub type TransformerLoader = Arc<dyn Fn(&Value) -> Result<Box<dyn Transformer>, PipelineError> + Send + Sync>;
/// `(y_true, y_pred) -> valor`.
pub type MetricFn = Arc<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

#[derive(Clone, Default)]
pub struct Components {
    estimators: IndexMap<String, EstimatorFactory>,
    transformers: IndexMap<String, TransformerFactory>,
    estimator_loaders: IndexMap<String, EstimatorLoader>,
    transformer_loaders: IndexMap<String, TransformerLoader>,
    metrics: IndexMap<String, MetricFn>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
         .field("estimators", &self.estimators.keys().collect::<Vec<_>>())
         .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
         .field("metrics", &self.metrics.keys().collect::<Vec<_>>())
         .finish()
    }
}

fn unknown(kind: &str, name: &str, known: impl Iterator<Item = String>) -> PipelineError {
    let known: Vec<String> = known.collect();
    PipelineError::config(format!("{kind} '{name}' is not registered (known: {})", known.join(", ")))
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_estimator(&mut self,
                              name: impl Into<String>,
                              factory: impl Fn(&Params) -> Result<Box<dyn Estimator>, PipelineError> + Send + Sync + 'static)
                              -> &mut Self {
        self.estimators.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_transformer(&mut self,
                                name: impl Into<String>,
                                factory: impl Fn() -> Result<Box<dyn Transformer>, PipelineError> + Send + Sync + 'static)
                                -> &mut Self {
        self.transformers.insert(name.into(), Arc::new(factory));
        self
    }

    /// `kind` debe coincidir con `Estimator::kind` de lo que se restaura.
    pub fn register_estimator_loader(&mut self,
                                     kind: impl Into<String>,
                                     loader: impl Fn(&Value) -> Result<Box<dyn Estimator>, PipelineError> + Send + Sync + 'static)
                                     -> &mut Self {
        self.estimator_loaders.insert(kind.into(), Arc::new(loader));
        self
    }

    pub fn register_transformer_loader(&mut self,
                                       kind: impl Into<String>,
                                       loader: impl Fn(&Value) -> Result<Box<dyn Transformer>, PipelineError> + Send + Sync + 'static)
                                       -> &mut Self {
        self.transformer_loaders.insert(kind.into(), Arc::new(loader));
        self
    }

    pub fn register_metric(&mut self,
                           name: impl Into<String>,
                           f: impl Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static)
                           -> &mut Self {
        self.metrics.insert(name.into(), Arc::new(f));
        self
    }

    pub fn estimator_factory(&self, name: &str) -> Result<EstimatorFactory, PipelineError> {
        self.estimators
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("estimator method", name, self.estimators.keys().cloned()))
    }

    pub fn transformer_factory(&self, name: &str) -> Result<TransformerFactory, PipelineError> {
        self.transformers
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("transformer method", name, self.transformers.keys().cloned()))
    }

    pub fn metric_fn(&self, name: &str) -> Result<MetricFn, PipelineError> {
        self.metrics
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("metric function", name, self.metrics.keys().cloned()))
    }

    pub fn restore_estimator(&self, saved: &SavedComponent) -> Result<Box<dyn Estimator>, PipelineError> {
        let loader = self.estimator_loaders
                         .get(&saved.kind)
                         .ok_or_else(|| unknown("estimator loader", &saved.kind, self.estimator_loaders.keys().cloned()))?;
        loader(&saved.state)
    }

    pub fn restore_transformer(&self, saved: &SavedComponent) -> Result<Box<dyn Transformer>, PipelineError> {
        let loader = self.transformer_loaders
                         .get(&saved.kind)
                         .ok_or_else(|| unknown("transformer loader", &saved.kind, self.transformer_loaders.keys().cloned()))?;
        loader(&saved.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_config_errors() {
        let mut components = Components::new();
        components.register_metric("steps.custom.weighted", |_, _| 1.0);
        assert!(components.metric_fn("steps.custom.weighted").is_ok());
        let err = components.estimator_factory("steps.train.missing").err().unwrap();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("steps.train.missing")));
    }
}
