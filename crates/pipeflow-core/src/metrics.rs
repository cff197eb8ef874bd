//! Métricas de evaluación de regresión.
//!
//! Cada métrica declara si "más alto es mejor"; eso decide el signo de la
//! pérdida en tuning y el orden del leaderboard.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::components::{Components, MetricFn};
use crate::errors::PipelineError;

/// Declaración de una métrica custom en la configuración.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetricConfig {
    pub name: String,
    pub function: String,
    #[serde(default)]
    pub greater_is_better: bool,
}

#[derive(Clone)]
enum MetricFunc {
    Builtin(fn(&[f64], &[f64]) -> f64),
    Custom(MetricFn),
}

#[derive(Clone)]
pub struct MetricDefinition {
    pub name: String,
    pub greater_is_better: bool,
    func: MetricFunc,
}

impl std::fmt::Debug for MetricDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricDefinition")
         .field("name", &self.name)
         .field("greater_is_better", &self.greater_is_better)
         .field("custom", &self.is_custom())
         .finish()
    }
}

impl MetricDefinition {
    pub fn is_custom(&self) -> bool {
        matches!(self.func, MetricFunc::Custom(_))
    }

    pub fn compute(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        match &self.func {
            MetricFunc::Builtin(f) => f(y_true, y_pred),
            MetricFunc::Custom(f) => f(y_true, y_pred),
        }
    }

    /// Pérdida a minimizar: `-valor` si más alto es mejor.
    pub fn loss(&self, value: f64) -> f64 {
        if self.greater_is_better { -value } else { value }
    }

    /// `true` si `a` es al menos tan bueno como `b`.
    pub fn at_least_as_good(&self, a: f64, b: f64) -> bool {
        if self.greater_is_better { a >= b } else { a <= b }
    }
}

fn residuals<'a>(y_true: &'a [f64], y_pred: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    y_true.iter().copied().zip(y_pred.iter().copied())
}

fn mean_of(it: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = it.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

fn mean_squared_error(y: &[f64], p: &[f64]) -> f64 {
    mean_of(residuals(y, p).map(|(a, b)| (a - b).powi(2)))
}

fn root_mean_squared_error(y: &[f64], p: &[f64]) -> f64 {
    mean_squared_error(y, p).sqrt()
}

fn mean_absolute_error(y: &[f64], p: &[f64]) -> f64 {
    mean_of(residuals(y, p).map(|(a, b)| (a - b).abs()))
}

fn mean_absolute_percentage_error(y: &[f64], p: &[f64]) -> f64 {
    mean_of(residuals(y, p).map(|(a, b)| (a - b).abs() / a.abs().max(f64::EPSILON)))
}

fn max_error(y: &[f64], p: &[f64]) -> f64 {
    residuals(y, p).map(|(a, b)| (a - b).abs()).fold(f64::NAN, f64::max)
}

fn r2_score(y: &[f64], p: &[f64]) -> f64 {
    let mean = mean_of(y.iter().copied());
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = residuals(y, p).map(|(a, b)| (a - b).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

fn example_count(y: &[f64], _p: &[f64]) -> f64 {
    y.len() as f64
}

const BUILTINS: &[(&str, bool, fn(&[f64], &[f64]) -> f64)] =
    &[("example_count", true, example_count),
      ("max_error", false, max_error),
      ("mean_absolute_error", false, mean_absolute_error),
      ("mean_absolute_percentage_error", false, mean_absolute_percentage_error),
      ("mean_squared_error", false, mean_squared_error),
      ("r2_score", true, r2_score),
      ("root_mean_squared_error", false, root_mean_squared_error)];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _, _)| *n == name)
}

pub fn builtin_metrics() -> Vec<MetricDefinition> {
    BUILTINS.iter()
            .map(|(name, gib, f)| MetricDefinition { name: name.to_string(),
                                                     greater_is_better: *gib,
                                                     func: MetricFunc::Builtin(*f) })
            .collect()
}

/// Built-ins + customs resueltos. Valida que la primaria exista.
pub fn resolve_metrics(primary: &str,
                       custom: &[CustomMetricConfig],
                       components: &Components)
                       -> Result<Vec<MetricDefinition>, PipelineError> {
    let mut metrics = builtin_metrics();
    for c in custom {
        if metrics.iter().any(|m| m.name == c.name) {
            return Err(PipelineError::config(format!("custom metric '{}' clashes with an existing metric", c.name)));
        }
        metrics.push(MetricDefinition { name: c.name.clone(),
                                        greater_is_better: c.greater_is_better,
                                        func: MetricFunc::Custom(components.metric_fn(&c.function)?) });
    }
    if !metrics.iter().any(|m| m.name == primary) {
        return Err(PipelineError::config(format!("primary metric '{primary}' is neither a built-in metric nor declared under metrics.custom")));
    }
    Ok(metrics)
}

pub fn find<'a>(metrics: &'a [MetricDefinition], name: &str) -> Option<&'a MetricDefinition> {
    metrics.iter().find(|m| m.name == name)
}

pub fn evaluate(metrics: &[MetricDefinition], y_true: &[f64], y_pred: &[f64]) -> IndexMap<String, f64> {
    metrics.iter().map(|m| (m.name.clone(), m.compute(y_true, y_pred))).collect()
}

/// Nombre con el que una métrica se loguea en tracking.
pub fn tracking_key(metric: &str, dataset: &str) -> String {
    format!("{metric}_on_data_{dataset}")
}

/// Orden de presentación: primaria, customs, built-ins; alfabético dentro de
/// cada grupo.
pub fn display_order(primary: &str, metrics: &[MetricDefinition]) -> Vec<String> {
    let mut names: Vec<(u8, &str)> = metrics.iter()
                                            .map(|m| {
                                                let group = if m.name == primary {
                                                    0
                                                } else if m.is_custom() {
                                                    1
                                                } else {
                                                    2
                                                };
                                                (group, m.name.as_str())
                                            })
                                            .collect();
    names.sort();
    names.into_iter().map(|(_, n)| n.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_values() {
        let y = [1.0, 2.0, 3.0];
        let p = [1.0, 2.0, 5.0];
        let values = evaluate(&builtin_metrics(), &y, &p);
        assert_eq!(values["mean_squared_error"], 4.0 / 3.0);
        assert_eq!(values["mean_absolute_error"], 2.0 / 3.0);
        assert_eq!(values["max_error"], 2.0);
        assert_eq!(values["example_count"], 3.0);
        assert_eq!(values["r2_score"], 1.0 - 4.0 / 2.0);
        assert!((values["root_mean_squared_error"] - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn loss_sign_follows_direction() {
        let metrics = builtin_metrics();
        assert_eq!(find(&metrics, "r2_score").unwrap().loss(0.8), -0.8);
        assert_eq!(find(&metrics, "mean_squared_error").unwrap().loss(0.8), 0.8);
    }

    #[test]
    fn unknown_primary_is_rejected() {
        let err = resolve_metrics("weighted_mae", &[], &Components::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let mut components = Components::new();
        components.register_metric("steps.custom.weighted_mae", |y, p| mean_absolute_error(y, p) * 2.0);
        let custom = [CustomMetricConfig { name: "weighted_mae".into(),
                                           function: "steps.custom.weighted_mae".into(),
                                           greater_is_better: false }];
        let metrics = resolve_metrics("weighted_mae", &custom, &components).unwrap();
        let order = display_order("r2_score", &metrics);
        assert_eq!(order[0], "r2_score");
        assert_eq!(order[1], "weighted_mae");
        assert_eq!(order[2], "example_count");
    }
}
