//! Capacidades fit/transform/predict de las que depende el motor.
//!
//! El core nunca conoce un tipo concreto de librería: los steps trabajan con
//! `Box<dyn Transformer>` / `Box<dyn Estimator>` construidos por fábricas
//! inyectadas (ver `components`).

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipelineError;
use crate::model::Frame;

/// Salida de `Transformer::transform`.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// Ya tabular, con nombres propios.
    Table(Frame),
    /// Matriz sin nombres; el step sintetiza o introspecciona los nombres.
    /// `n_features` vale también cuando no hay filas.
    Matrix { n_features: usize, rows: Vec<Vec<f64>> },
}

impl Transformed {
    pub fn n_features(&self) -> usize {
        match self {
            Transformed::Table(f) => f.n_cols(),
            Transformed::Matrix { n_features, .. } => *n_features,
        }
    }
}

pub trait Transformer: Send + Sync {
    fn kind(&self) -> &str;

    fn fit(&mut self, x: &Frame) -> Result<(), PipelineError>;

    fn transform(&self, x: &Frame) -> Result<Transformed, PipelineError>;

    /// Introspección de nombres de salida. `None` = no soportada;
    /// `Some(Err(_))` = soportada pero falló.
    fn feature_names_out(&self, _input: &[String]) -> Option<Result<Vec<String>, PipelineError>> {
        None
    }

    /// Estado ajustado, serializable.
    fn state(&self) -> Result<Value, PipelineError>;

    /// Representación legible para la card.
    fn describe(&self) -> String {
        self.kind().to_string()
    }

    fn save(&self) -> Result<SavedComponent, PipelineError> {
        Ok(SavedComponent { kind: self.kind().to_string(), state: self.state()? })
    }
}

pub trait Estimator: Send + Sync {
    fn kind(&self) -> &str;

    fn fit(&mut self, x: &Frame, y: &[f64]) -> Result<(), PipelineError>;

    fn predict(&self, x: &Frame) -> Result<Vec<f64>, PipelineError>;

    /// Parámetros efectivos del estimador.
    fn params(&self) -> Params;

    fn state(&self) -> Result<Value, PipelineError>;

    fn describe(&self) -> String {
        let params: Vec<String> = self.params().iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}({})", self.kind(), params.join(", "))
    }

    fn save(&self) -> Result<SavedComponent, PipelineError> {
        Ok(SavedComponent { kind: self.kind().to_string(), state: self.state()? })
    }
}

/// Componente ajustado persistido: `kind` selecciona el loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedComponent {
    pub kind: String,
    pub state: Value,
}

/// Valor escalar de un hiperparámetro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

pub type Params = IndexMap<String, ParamValue>;

impl ParamValue {
    pub fn from_json(value: &Value) -> Result<Self, PipelineError> {
        match value {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(ParamValue::Int(i)),
                None => n.as_f64()
                         .map(ParamValue::Float)
                         .ok_or_else(|| PipelineError::config(format!("unsupported number {n}"))),
            },
            Value::String(s) => Ok(ParamValue::Str(s.clone())),
            other => Err(PipelineError::config(format!("parameter values must be scalars, got {other}"))),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Str(s) => s.trim().parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            ParamValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Compara contra un valor ya logueado como texto: enteros y floats
    /// numéricamente, strings tras recortar espacios.
    pub fn matches_logged(&self, logged: &str) -> bool {
        match self {
            ParamValue::Int(i) => logged.trim().parse::<i64>().map(|l| l == *i).unwrap_or(false),
            ParamValue::Float(f) => logged.trim().parse::<f64>().map(|l| l == *f).unwrap_or(false),
            ParamValue::Str(s) => s.trim() == logged.trim(),
            ParamValue::Bool(b) => logged.trim().eq_ignore_ascii_case(&b.to_string()),
        }
    }

    /// Valor YAML portable (números nativos, nunca strings).
    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            ParamValue::Bool(b) => serde_yaml::Value::Bool(*b),
            ParamValue::Int(i) => serde_yaml::Value::Number((*i).into()),
            ParamValue::Float(f) => serde_yaml::Value::Number((*f).into()),
            ParamValue::Str(s) => serde_yaml::Value::String(s.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(s) => write!(f, "{s}"),
        }
    }
}

pub fn params_from_json(value: &Value) -> Result<Params, PipelineError> {
    match value {
        Value::Null => Ok(Params::new()),
        Value::Object(map) => {
            let mut params = Params::new();
            for (k, v) in map {
                params.insert(k.clone(), ParamValue::from_json(v)?);
            }
            Ok(params)
        }
        other => Err(PipelineError::config(format!("expected a mapping of parameters, got {other}"))),
    }
}

pub fn params_to_json(params: &Params) -> Value {
    Value::Object(params.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Lee un parámetro numérico con default; un tipo incorrecto es error.
pub fn param_f64(params: &Params, key: &str, default: f64) -> Result<f64, PipelineError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v.as_f64()
                    .ok_or_else(|| PipelineError::Estimator(format!("parameter '{key}' must be numeric, got '{v}'"))),
    }
}

pub fn param_usize(params: &Params, key: &str, default: usize) -> Result<usize, PipelineError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v.as_i64()
                    .filter(|i| *i >= 0)
                    .map(|i| i as usize)
                    .ok_or_else(|| PipelineError::Estimator(format!("parameter '{key}' must be a non-negative integer, got '{v}'"))),
    }
}

pub fn param_bool(params: &Params, key: &str, default: bool) -> Result<bool, PipelineError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v.as_bool()
                    .ok_or_else(|| PipelineError::Estimator(format!("parameter '{key}' must be a boolean, got '{v}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logged_comparison_is_numeric_or_trimmed() {
        assert!(ParamValue::Float(0.1).matches_logged("0.1"));
        assert!(ParamValue::Int(3).matches_logged(" 3 "));
        assert!(!ParamValue::Int(3).matches_logged("3.5"));
        assert!(ParamValue::Str("abc".into()).matches_logged("abc  "));
    }

    #[test]
    fn params_parse_scalars_only() {
        let p = params_from_json(&json!({"alpha": 0.5, "n": 3, "fit": true, "name": "x"})).unwrap();
        assert_eq!(p["alpha"], ParamValue::Float(0.5));
        assert_eq!(p["n"], ParamValue::Int(3));
        assert!(params_from_json(&json!({"bad": [1]})).is_err());
        assert_eq!(param_usize(&p, "n", 1).unwrap(), 3);
        assert!(param_f64(&p, "name", 1.0).is_err());
    }
}
