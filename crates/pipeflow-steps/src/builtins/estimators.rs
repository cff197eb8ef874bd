//! Estimadores de regresión incluidos.

use log::debug;
use pipeflow_core::capability::{param_bool, param_f64, param_usize, Estimator, ParamValue, Params};
use pipeflow_core::{Frame, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LINEAR_REGRESSION: &str = "pipeflow.estimators.linear_regression";
pub const KNN_REGRESSOR: &str = "pipeflow.estimators.knn_regressor";
pub const MEAN_REGRESSOR: &str = "pipeflow.estimators.mean_regressor";

/// Rechaza claves que el estimador no conoce.
fn check_keys(kind: &str, params: &Params, allowed: &[&str]) -> Result<(), PipelineError> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(k) => Err(PipelineError::Estimator(format!("{kind} got an unexpected parameter '{k}' (allowed: {})",
                                                        allowed.join(", ")))),
        None => Ok(()),
    }
}

fn check_fit_input(x: &Frame, y: &[f64]) -> Result<(), PipelineError> {
    if x.n_rows() != y.len() {
        return Err(PipelineError::Estimator(format!("X has {} rows but y has {}", x.n_rows(), y.len())));
    }
    if x.n_rows() == 0 {
        return Err(PipelineError::Estimator("cannot fit on an empty dataset".into()));
    }
    if y.iter().any(|v| !v.is_finite()) || x.rows().iter().flatten().any(|v| !v.is_finite()) {
        return Err(PipelineError::Estimator("input contains NaN or infinity".into()));
    }
    Ok(())
}

/// Resuelve `a x = b` con eliminación gaussiana y pivoteo parcial.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        let pivot_row = a[col].clone();
        for row in col + 1..n {
            let factor = a[row][col] / pivot_row[col];
            for k in col..n {
                a[row][k] -= factor * pivot_row[k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Mínimos cuadrados con penalización L2 opcional (`alpha`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    alpha: f64,
    fit_intercept: bool,
    #[serde(default)]
    coef: Vec<f64>,
    #[serde(default)]
    intercept: f64,
}

impl LinearRegression {
    pub fn from_params(params: &Params) -> Result<Self, PipelineError> {
        check_keys(LINEAR_REGRESSION, params, &["alpha", "fit_intercept"])?;
        let alpha = param_f64(params, "alpha", 0.0)?;
        if alpha < 0.0 {
            return Err(PipelineError::Estimator(format!("alpha must be >= 0, got {alpha}")));
        }
        Ok(Self { alpha, fit_intercept: param_bool(params, "fit_intercept", true)?, coef: Vec::new(), intercept: 0.0 })
    }

    pub fn coefficients(&self) -> (&[f64], f64) {
        (&self.coef, self.intercept)
    }
}

impl Estimator for LinearRegression {
    fn kind(&self) -> &str {
        LINEAR_REGRESSION
    }

    fn fit(&mut self, x: &Frame, y: &[f64]) -> Result<(), PipelineError> {
        check_fit_input(x, y)?;
        let (n, p) = (x.n_rows(), x.n_cols());
        let (x_mean, y_mean) = if self.fit_intercept {
            let means = (0..p).map(|j| x.rows().iter().map(|r| r[j]).sum::<f64>() / n as f64).collect::<Vec<_>>();
            (means, y.iter().sum::<f64>() / n as f64)
        } else {
            (vec![0.0; p], 0.0)
        };

        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];
        for (row, target) in x.rows().iter().zip(y) {
            let centered: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
            let t = target - y_mean;
            for i in 0..p {
                xty[i] += centered[i] * t;
                for j in 0..p {
                    xtx[i][j] += centered[i] * centered[j];
                }
            }
        }
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += self.alpha;
        }
        let coef = if p == 0 {
            Vec::new()
        } else {
            solve(xtx, xty).ok_or_else(|| {
                               PipelineError::Estimator("singular design matrix; try alpha > 0 or remove collinear features".into())
                           })?
        };
        self.intercept = y_mean - coef.iter().zip(&x_mean).map(|(c, m)| c * m).sum::<f64>();
        self.coef = coef;
        debug!("linear regression fitted on {n} rows, {p} features");
        Ok(())
    }

    fn predict(&self, x: &Frame) -> Result<Vec<f64>, PipelineError> {
        if x.n_cols() != self.coef.len() {
            return Err(PipelineError::Estimator(format!("expected {} features, got {}", self.coef.len(), x.n_cols())));
        }
        Ok(x.rows()
            .iter()
            .map(|r| self.intercept + r.iter().zip(&self.coef).map(|(v, c)| v * c).sum::<f64>())
            .collect())
    }

    fn params(&self) -> Params {
        Params::from([("alpha".to_string(), ParamValue::Float(self.alpha)),
                      ("fit_intercept".to_string(), ParamValue::Bool(self.fit_intercept))])
    }

    fn state(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weights {
    Uniform,
    Distance,
}

/// k vecinos más cercanos (distancia euclídea).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnRegressor {
    n_neighbors: usize,
    weights: Weights,
    #[serde(default)]
    x: Vec<Vec<f64>>,
    #[serde(default)]
    y: Vec<f64>,
}

impl KnnRegressor {
    pub fn from_params(params: &Params) -> Result<Self, PipelineError> {
        check_keys(KNN_REGRESSOR, params, &["n_neighbors", "weights"])?;
        let n_neighbors = param_usize(params, "n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(PipelineError::Estimator("n_neighbors must be >= 1".into()));
        }
        let weights = match params.get("weights").map(ParamValue::to_string).as_deref() {
            None | Some("uniform") => Weights::Uniform,
            Some("distance") => Weights::Distance,
            Some(other) => return Err(PipelineError::Estimator(format!("weights must be 'uniform' or 'distance', got '{other}'"))),
        };
        Ok(Self { n_neighbors, weights, x: Vec::new(), y: Vec::new() })
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut dists: Vec<(f64, f64)> = self.x
                                             .iter()
                                             .zip(&self.y)
                                             .map(|(train, y)| {
                                                 let d = train.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
                                                 (d, *y)
                                             })
                                             .collect();
        dists.sort_by(|a, b| a.0.total_cmp(&b.0));
        let nearest = &dists[..self.n_neighbors.min(dists.len())];
        match self.weights {
            Weights::Uniform => nearest.iter().map(|(_, y)| y).sum::<f64>() / nearest.len() as f64,
            Weights::Distance => {
                let exact: Vec<f64> = nearest.iter().filter(|(d, _)| *d == 0.0).map(|(_, y)| *y).collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (num, den) = nearest.iter().fold((0.0, 0.0), |(n, d), (dist, y)| (n + y / dist, d + 1.0 / dist));
                num / den
            }
        }
    }
}

impl Estimator for KnnRegressor {
    fn kind(&self) -> &str {
        KNN_REGRESSOR
    }

    fn fit(&mut self, x: &Frame, y: &[f64]) -> Result<(), PipelineError> {
        check_fit_input(x, y)?;
        self.x = x.rows().to_vec();
        self.y = y.to_vec();
        Ok(())
    }

    fn predict(&self, x: &Frame) -> Result<Vec<f64>, PipelineError> {
        if self.y.is_empty() {
            return Err(PipelineError::Estimator(format!("{KNN_REGRESSOR} is not fitted")));
        }
        Ok(x.rows().iter().map(|r| self.predict_row(r)).collect())
    }

    fn params(&self) -> Params {
        let weights = match self.weights {
            Weights::Uniform => "uniform",
            Weights::Distance => "distance",
        };
        Params::from([("n_neighbors".to_string(), ParamValue::Int(self.n_neighbors as i64)),
                      ("weights".to_string(), ParamValue::Str(weights.to_string()))])
    }

    fn state(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Baseline: predice la media (o mediana) del target de entrenamiento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanRegressor {
    strategy: String,
    #[serde(default)]
    value: Option<f64>,
}

impl MeanRegressor {
    pub fn from_params(params: &Params) -> Result<Self, PipelineError> {
        check_keys(MEAN_REGRESSOR, params, &["strategy"])?;
        let strategy = params.get("strategy").map(ParamValue::to_string).unwrap_or_else(|| "mean".to_string());
        if strategy != "mean" && strategy != "median" {
            return Err(PipelineError::Estimator(format!("strategy must be 'mean' or 'median', got '{strategy}'")));
        }
        Ok(Self { strategy, value: None })
    }
}

impl Estimator for MeanRegressor {
    fn kind(&self) -> &str {
        MEAN_REGRESSOR
    }

    fn fit(&mut self, x: &Frame, y: &[f64]) -> Result<(), PipelineError> {
        if x.n_rows() != y.len() || y.is_empty() {
            return Err(PipelineError::Estimator("target must be non-empty and match X".into()));
        }
        let value = if self.strategy == "median" {
            let mut sorted = y.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
        } else {
            y.iter().sum::<f64>() / y.len() as f64
        };
        self.value = Some(value);
        Ok(())
    }

    fn predict(&self, x: &Frame) -> Result<Vec<f64>, PipelineError> {
        let value = self.value.ok_or_else(|| PipelineError::Estimator(format!("{MEAN_REGRESSOR} is not fitted")))?;
        Ok(vec![value; x.n_rows()])
    }

    fn params(&self) -> Params {
        Params::from([("strategy".to_string(), ParamValue::Str(self.strategy.clone()))])
    }

    fn state(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> (Frame, Vec<f64>) {
        let x = Frame::new(vec!["x".into()], (0..6).map(|i| vec![i as f64]).collect()).unwrap();
        let y = (0..6).map(|i| 2.0 * i as f64 + 1.0).collect();
        (x, y)
    }

    #[test]
    fn linear_regression_recovers_line() {
        let (x, y) = line();
        let mut model = LinearRegression::from_params(&Params::new()).unwrap();
        model.fit(&x, &y).unwrap();
        let (coef, intercept) = model.coefficients();
        assert!((coef[0] - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_params_are_rejected() {
        let params = Params::from([("depth".to_string(), ParamValue::Int(3))]);
        assert!(matches!(LinearRegression::from_params(&params), Err(PipelineError::Estimator(_))));
    }

    #[test]
    fn knn_with_one_neighbor_memorizes() {
        let (x, y) = line();
        let params = Params::from([("n_neighbors".to_string(), ParamValue::Int(1))]);
        let mut model = KnnRegressor::from_params(&params).unwrap();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn fit_rejects_missing_values() {
        let x = Frame::new(vec!["x".into()], vec![vec![f64::NAN]]).unwrap();
        let mut model = LinearRegression::from_params(&Params::new()).unwrap();
        assert!(model.fit(&x, &[1.0]).is_err());
    }

    #[test]
    fn median_baseline() {
        let (x, y) = line();
        let params = Params::from([("strategy".to_string(), ParamValue::Str("median".into()))]);
        let mut model = MeanRegressor::from_params(&params).unwrap();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap()[0], 6.0);
    }
}
