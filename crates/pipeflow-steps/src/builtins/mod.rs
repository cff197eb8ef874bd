//! Componentes incluidos y su registro.
//!
//! `builtin_components()` devuelve un `Components` con todos los
//! transformadores, estimadores, loaders y funciones de métrica de este
//! crate. Aplicaciones con componentes propios pueden partir de él y
//! registrar más nombres.

pub mod estimators;
pub mod transformers;

use pipeflow_core::capability::{Estimator, Transformer};
use pipeflow_core::{Components, PipelineError};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use estimators::{KnnRegressor, LinearRegression, MeanRegressor, KNN_REGRESSOR, LINEAR_REGRESSION, MEAN_REGRESSOR};
pub use transformers::{IdentityTransformer, PolynomialFeatures, StandardScaler, IDENTITY, POLYNOMIAL_FEATURES, STANDARD_SCALER};

pub const MEDIAN_ABSOLUTE_ERROR: &str = "pipeflow.metrics.median_absolute_error";

fn restore<T: DeserializeOwned>(kind: &str, state: &Value) -> Result<T, PipelineError> {
    serde_json::from_value(state.clone()).map_err(|e| PipelineError::Serialization(format!("cannot restore {kind}: {e}")))
}

fn boxed_estimator<E: Estimator + 'static>(e: E) -> Box<dyn Estimator> {
    Box::new(e)
}

fn boxed_transformer<T: Transformer + 'static>(t: T) -> Box<dyn Transformer> {
    Box::new(t)
}

fn median_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut errors: Vec<f64> = y_true.iter().zip(y_pred).map(|(a, b)| (a - b).abs()).collect();
    if errors.is_empty() {
        return f64::NAN;
    }
    errors.sort_by(f64::total_cmp);
    let mid = errors.len() / 2;
    if errors.len() % 2 == 0 { (errors[mid - 1] + errors[mid]) / 2.0 } else { errors[mid] }
}

pub fn builtin_components() -> Components {
    let mut c = Components::new();
    c.register_transformer(IDENTITY, || Ok(boxed_transformer(IdentityTransformer::new())))
     .register_transformer(STANDARD_SCALER, || Ok(boxed_transformer(StandardScaler::new())))
     .register_transformer(POLYNOMIAL_FEATURES, || Ok(boxed_transformer(PolynomialFeatures::new())))
     .register_transformer_loader(IDENTITY, |s| Ok(boxed_transformer(restore::<IdentityTransformer>(IDENTITY, s)?)))
     .register_transformer_loader(STANDARD_SCALER, |s| Ok(boxed_transformer(restore::<StandardScaler>(STANDARD_SCALER, s)?)))
     .register_transformer_loader(POLYNOMIAL_FEATURES, |s| {
         Ok(boxed_transformer(restore::<PolynomialFeatures>(POLYNOMIAL_FEATURES, s)?))
     })
     .register_estimator(LINEAR_REGRESSION, |p| Ok(boxed_estimator(LinearRegression::from_params(p)?)))
     .register_estimator(KNN_REGRESSOR, |p| Ok(boxed_estimator(KnnRegressor::from_params(p)?)))
     .register_estimator(MEAN_REGRESSOR, |p| Ok(boxed_estimator(MeanRegressor::from_params(p)?)))
     .register_estimator_loader(LINEAR_REGRESSION, |s| Ok(boxed_estimator(restore::<LinearRegression>(LINEAR_REGRESSION, s)?)))
     .register_estimator_loader(KNN_REGRESSOR, |s| Ok(boxed_estimator(restore::<KnnRegressor>(KNN_REGRESSOR, s)?)))
     .register_estimator_loader(MEAN_REGRESSOR, |s| Ok(boxed_estimator(restore::<MeanRegressor>(MEAN_REGRESSOR, s)?)))
     .register_metric(MEDIAN_ABSOLUTE_ERROR, median_absolute_error);
    c
}
