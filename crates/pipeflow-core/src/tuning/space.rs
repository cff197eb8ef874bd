//! Espacio de búsqueda de hiperparámetros.
//!
//! Cada parámetro es `values: [...]` (elección) o `distribution: <nombre>`
//! con sus argumentos. Las distribuciones log usan límites en escala log
//! (`exp(uniform(low, high))`).

use std::f64::consts::PI;

use indexmap::IndexMap;
use rand::Rng;
use serde_json::Value;

use crate::capability::{ParamValue, Params};
use crate::errors::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Choice(Vec<ParamValue>),
    Uniform { low: f64, high: f64 },
    LogUniform { low: f64, high: f64 },
    QUniform { low: f64, high: f64, q: f64 },
    QLogUniform { low: f64, high: f64, q: f64 },
    Normal { mu: f64, sigma: f64 },
    LogNormal { mu: f64, sigma: f64 },
    QNormal { mu: f64, sigma: f64, q: f64 },
    /// `[low, high)`.
    RandInt { low: i64, high: i64 },
}

fn arg(name: &str, spec: &Value, key: &str) -> Result<f64, PipelineError> {
    spec.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| PipelineError::config(format!("tuning parameter '{name}': missing numeric argument '{key}'")))
}

fn check(name: &str, ok: bool, msg: &str) -> Result<(), PipelineError> {
    if ok {
        Ok(())
    } else {
        Err(PipelineError::config(format!("tuning parameter '{name}': {msg}")))
    }
}

fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Box-Muller; u1 en (0, 1] para evitar ln(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn quantize(value: f64, q: f64) -> f64 {
    (value / q).round() * q
}

impl Distribution {
    pub fn from_json(name: &str, spec: &Value) -> Result<Self, PipelineError> {
        if let Some(values) = spec.get("values") {
            let values = values.as_array()
                               .filter(|v| !v.is_empty())
                               .ok_or_else(|| PipelineError::config(format!("tuning parameter '{name}': 'values' must be a non-empty list")))?;
            return Ok(Distribution::Choice(values.iter().map(ParamValue::from_json).collect::<Result<_, _>>()?));
        }
        let dist = spec.get("distribution")
                       .and_then(Value::as_str)
                       .ok_or_else(|| PipelineError::config(format!("tuning parameter '{name}' needs either 'values' or 'distribution'")))?;
        let d = match dist {
            "uniform" => Distribution::Uniform { low: arg(name, spec, "low")?, high: arg(name, spec, "high")? },
            "loguniform" => Distribution::LogUniform { low: arg(name, spec, "low")?, high: arg(name, spec, "high")? },
            "quniform" => Distribution::QUniform { low: arg(name, spec, "low")?, high: arg(name, spec, "high")?, q: arg(name, spec, "q")? },
            "qloguniform" => Distribution::QLogUniform { low: arg(name, spec, "low")?,
                                                         high: arg(name, spec, "high")?,
                                                         q: arg(name, spec, "q")? },
            "normal" => Distribution::Normal { mu: arg(name, spec, "mu")?, sigma: arg(name, spec, "sigma")? },
            "lognormal" => Distribution::LogNormal { mu: arg(name, spec, "mu")?, sigma: arg(name, spec, "sigma")? },
            "qnormal" => Distribution::QNormal { mu: arg(name, spec, "mu")?, sigma: arg(name, spec, "sigma")?, q: arg(name, spec, "q")? },
            "randint" => {
                let (low, high) = match spec.get("upper") {
                    Some(_) => (0.0, arg(name, spec, "upper")?),
                    None => (arg(name, spec, "low")?, arg(name, spec, "high")?),
                };
                Distribution::RandInt { low: low as i64, high: high as i64 }
            }
            other => return Err(PipelineError::config(format!("tuning parameter '{name}': unsupported distribution '{other}'"))),
        };
        d.validate(name)?;
        Ok(d)
    }

    fn validate(&self, name: &str) -> Result<(), PipelineError> {
        match *self {
            Distribution::Choice(_) => Ok(()),
            Distribution::Uniform { low, high } | Distribution::LogUniform { low, high } => check(name, low < high, "'low' must be < 'high'"),
            Distribution::QUniform { low, high, q } | Distribution::QLogUniform { low, high, q } => {
                check(name, low < high, "'low' must be < 'high'")?;
                check(name, q > 0.0, "'q' must be > 0")
            }
            Distribution::Normal { sigma, .. } | Distribution::LogNormal { sigma, .. } => check(name, sigma > 0.0, "'sigma' must be > 0"),
            Distribution::QNormal { sigma, q, .. } => {
                check(name, sigma > 0.0, "'sigma' must be > 0")?;
                check(name, q > 0.0, "'q' must be > 0")
            }
            Distribution::RandInt { low, high } => check(name, low < high, "'low' must be < 'high'"),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            Distribution::Choice(values) => values[rng.gen_range(0..values.len())].clone(),
            Distribution::Uniform { low, high } => ParamValue::Float(rng.gen_range(*low..*high)),
            Distribution::LogUniform { low, high } => ParamValue::Float(rng.gen_range(*low..*high).exp()),
            Distribution::QUniform { low, high, q } => ParamValue::Float(quantize(rng.gen_range(*low..*high), *q)),
            Distribution::QLogUniform { low, high, q } => ParamValue::Float(quantize(rng.gen_range(*low..*high).exp(), *q)),
            Distribution::Normal { mu, sigma } => ParamValue::Float(mu + sigma * standard_normal(rng)),
            Distribution::LogNormal { mu, sigma } => ParamValue::Float((mu + sigma * standard_normal(rng)).exp()),
            Distribution::QNormal { mu, sigma, q } => ParamValue::Float(quantize(mu + sigma * standard_normal(rng), *q)),
            Distribution::RandInt { low, high } => ParamValue::Int(rng.gen_range(*low..*high)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpace {
    params: IndexMap<String, Distribution>,
    raw: Value,
}

impl SearchSpace {
    pub fn from_json(value: &Value) -> Result<Self, PipelineError> {
        let map = value.as_object()
                       .ok_or_else(|| PipelineError::config("tuning 'parameters' must be a mapping"))?;
        if map.is_empty() {
            return Err(PipelineError::config("tuning 'parameters' must declare at least one parameter"));
        }
        let mut params = IndexMap::new();
        for (name, spec) in map {
            params.insert(name.clone(), Distribution::from_json(name, spec)?);
        }
        Ok(Self { params, raw: value.clone() })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Definición original, para mostrarla en la card.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Params {
        self.params.iter().map(|(k, d)| (k.clone(), d.sample(rng))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    #[test]
    fn samples_stay_in_bounds() {
        let space = SearchSpace::from_json(&json!({
            "alpha": {"distribution": "uniform", "low": 0.0, "high": 0.5},
            "k": {"distribution": "randint", "low": 1, "high": 4},
            "step": {"distribution": "quniform", "low": 0.0, "high": 10.0, "q": 2.0},
            "kind": {"values": ["a", "b"]}
        })).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let p = space.sample(&mut rng);
            let alpha = p["alpha"].as_f64().unwrap();
            assert!((0.0..0.5).contains(&alpha));
            let k = p["k"].as_i64().unwrap();
            assert!((1..4).contains(&k));
            assert_eq!(p["step"].as_f64().unwrap() % 2.0, 0.0);
            assert!(matches!(p["kind"], ParamValue::Str(ref s) if s == "a" || s == "b"));
        }
    }

    #[test]
    fn randint_upper_form() {
        let d = Distribution::from_json("n", &json!({"distribution": "randint", "upper": 3})).unwrap();
        assert_eq!(d, Distribution::RandInt { low: 0, high: 3 });
    }

    #[test]
    fn unknown_distribution_is_config_error() {
        let err = SearchSpace::from_json(&json!({"a": {"distribution": "pareto", "low": 0, "high": 1}})).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("pareto")));
        assert!(SearchSpace::from_json(&json!({"a": {"distribution": "uniform", "low": 1, "high": 1}})).is_err());
        assert!(SearchSpace::from_json(&json!({"a": {"values": []}})).is_err());
    }
}
