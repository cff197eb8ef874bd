//! Transformadores incluidos: identidad, escalado estándar y features
//! polinómicas de grado 2.

use pipeflow_core::capability::{Transformed, Transformer};
use pipeflow_core::{Frame, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const IDENTITY: &str = "pipeflow.transformers.identity";
pub const STANDARD_SCALER: &str = "pipeflow.transformers.standard_scaler";
pub const POLYNOMIAL_FEATURES: &str = "pipeflow.transformers.polynomial_features";

fn not_fitted(kind: &str) -> PipelineError {
    PipelineError::Estimator(format!("{kind} is not fitted"))
}

fn check_columns(kind: &str, fitted: &[String], x: &Frame) -> Result<(), PipelineError> {
    if fitted != x.columns() {
        return Err(PipelineError::Estimator(format!("{kind} was fitted on columns [{}] but received [{}]",
                                                    fitted.join(", "),
                                                    x.columns().join(", "))));
    }
    Ok(())
}

/// Devuelve la entrada tal cual, ya tabular.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityTransformer {
    columns: Vec<String>,
}

impl IdentityTransformer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for IdentityTransformer {
    fn kind(&self) -> &str {
        IDENTITY
    }

    fn fit(&mut self, x: &Frame) -> Result<(), PipelineError> {
        self.columns = x.columns().to_vec();
        Ok(())
    }

    fn transform(&self, x: &Frame) -> Result<Transformed, PipelineError> {
        Ok(Transformed::Table(x.clone()))
    }

    fn feature_names_out(&self, input: &[String]) -> Option<Result<Vec<String>, PipelineError>> {
        Some(Ok(input.to_vec()))
    }

    fn state(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }

    fn describe(&self) -> String {
        "Identity()".to_string()
    }
}

/// `(x - media) / desviación`. Los faltantes se imputan con la media (0 tras
/// escalar). Columnas constantes usan escala 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for StandardScaler {
    fn kind(&self) -> &str {
        STANDARD_SCALER
    }

    fn fit(&mut self, x: &Frame) -> Result<(), PipelineError> {
        let profile = x.profile();
        self.columns = x.columns().to_vec();
        self.means = profile.iter().map(|p| if p.mean.is_nan() { 0.0 } else { p.mean }).collect();
        // desviación poblacional, como el scaler clásico
        self.scales = profile.iter()
                             .map(|p| {
                                 let present = (p.count - p.missing) as f64;
                                 let var = if present > 1.0 && !p.std.is_nan() {
                                     p.std.powi(2) * (present - 1.0) / present
                                 } else {
                                     0.0
                                 };
                                 if var > 0.0 { var.sqrt() } else { 1.0 }
                             })
                             .collect();
        Ok(())
    }

    fn transform(&self, x: &Frame) -> Result<Transformed, PipelineError> {
        if self.columns.is_empty() && x.n_cols() > 0 {
            return Err(not_fitted(self.kind()));
        }
        check_columns(self.kind(), &self.columns, x)?;
        let rows = x.rows()
                    .iter()
                    .map(|row| {
                        row.iter()
                           .zip(self.means.iter().zip(&self.scales))
                           .map(|(v, (m, s))| if v.is_nan() { 0.0 } else { (v - m) / s })
                           .collect()
                    })
                    .collect();
        Ok(Transformed::Matrix { n_features: self.columns.len(), rows })
    }

    fn feature_names_out(&self, input: &[String]) -> Option<Result<Vec<String>, PipelineError>> {
        if input != self.columns.as_slice() {
            return Some(Err(PipelineError::Estimator(format!("input features [{}] do not match fitted features",
                                                             input.join(", ")))));
        }
        Some(Ok(input.to_vec()))
    }

    fn state(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }

    fn describe(&self) -> String {
        format!("StandardScaler(n_features={})", self.columns.len())
    }
}

/// Features de grado 2 sin sesgo: `x_i` y luego `x_i * x_j` con `i <= j`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolynomialFeatures {
    columns: Vec<String>,
}

impl PolynomialFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.columns.len();
        (0..n).flat_map(move |i| (i..n).map(move |j| (i, j)))
    }
}

impl Transformer for PolynomialFeatures {
    fn kind(&self) -> &str {
        POLYNOMIAL_FEATURES
    }

    fn fit(&mut self, x: &Frame) -> Result<(), PipelineError> {
        self.columns = x.columns().to_vec();
        Ok(())
    }

    fn transform(&self, x: &Frame) -> Result<Transformed, PipelineError> {
        check_columns(self.kind(), &self.columns, x)?;
        let rows = x.rows()
                    .iter()
                    .map(|row| {
                        let mut out = row.clone();
                        out.extend(self.pairs().map(|(i, j)| row[i] * row[j]));
                        out
                    })
                    .collect();
        Ok(Transformed::Matrix { n_features: self.columns.len() + self.pairs().count(), rows })
    }

    fn feature_names_out(&self, input: &[String]) -> Option<Result<Vec<String>, PipelineError>> {
        if input.len() != self.columns.len() {
            return Some(Err(PipelineError::Estimator(format!("expected {} input features, got {}",
                                                             self.columns.len(),
                                                             input.len()))));
        }
        let mut names = input.to_vec();
        names.extend(self.pairs().map(|(i, j)| {
                                     if i == j {
                                         format!("{}^2", input[i])
                                     } else {
                                         format!("{} {}", input[i], input[j])
                                     }
                                 }));
        Some(Ok(names))
    }

    fn state(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }

    fn describe(&self) -> String {
        format!("PolynomialFeatures(degree=2, include_bias=false, n_input={})", self.columns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec!["a".into(), "b".into()], vec![vec![1.0, 10.0], vec![3.0, f64::NAN]]).unwrap()
    }

    #[test]
    fn scaler_centers_and_imputes() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&frame()).unwrap();
        let Transformed::Matrix { rows: m, .. } = scaler.transform(&frame()).unwrap() else { panic!("expected matrix") };
        assert_eq!(m[0][0], -1.0);
        assert_eq!(m[1][0], 1.0);
        assert_eq!(m[1][1], 0.0);
    }

    #[test]
    fn polynomial_names_follow_products() {
        let mut poly = PolynomialFeatures::new();
        poly.fit(&frame()).unwrap();
        let names = poly.feature_names_out(&["a".into(), "b".into()]).unwrap().unwrap();
        assert_eq!(names, vec!["a", "b", "a^2", "a b", "b^2"]);
        assert_eq!(poly.transform(&frame()).unwrap().n_features(), 5);
        assert!(poly.feature_names_out(&["a".into()]).unwrap().is_err());
    }

    #[test]
    fn state_roundtrips_through_serde() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&frame()).unwrap();
        let restored: StandardScaler = serde_json::from_value(scaler.state().unwrap()).unwrap();
        assert_eq!(restored.transform(&frame()).unwrap(), scaler.transform(&frame()).unwrap());
    }
}
