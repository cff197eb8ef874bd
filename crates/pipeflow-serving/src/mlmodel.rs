//! Metadatos de un modelo guardado (`MLmodel`, YAML).
//!
//! `loader_module` elige el loader registrado en `ModelRegistry`;
//! `artifacts` son rutas relativas al directorio del modelo.

use std::fs;
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServingError;

pub const MLMODEL_FILE: &str = "MLmodel";

/// Columna de una firma: nombre opcional y tipo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub dtype: String,
}

impl ColSpec {
    pub fn new(name: impl Into<String>, dtype: impl Into<String>) -> Self {
        Self { name: Some(name.into()), dtype: dtype.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColSpec>,
    #[serde(default)]
    pub outputs: Vec<ColSpec>,
}

impl ModelSignature {
    /// Nombres de las columnas de entrada que tienen nombre.
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().filter_map(|c| c.name.as_deref()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModel {
    pub loader_module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_file: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub artifacts: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub model_config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ModelSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub utc_time_created: String,
}

impl MlModel {
    pub fn new(loader_module: impl Into<String>) -> Self {
        Self { loader_module: loader_module.into(),
               model_file: None,
               artifacts: IndexMap::new(),
               model_config: Map::new(),
               signature: None,
               run_id: None,
               utc_time_created: Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string() }
    }

    pub fn read(model_dir: &Path) -> Result<Self, ServingError> {
        let path = model_dir.join(MLMODEL_FILE);
        if !path.is_file() {
            return Err(ServingError::InvalidModel(format!("{} not found", path.display())));
        }
        Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn write(&self, model_dir: &Path) -> Result<(), ServingError> {
        fs::create_dir_all(model_dir)?;
        fs::write(model_dir.join(MLMODEL_FILE), serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `model_config` guardado con `overrides` encima (las claves de
    /// `overrides` ganan).
    pub fn merged_config(&self, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut config = self.model_config.clone();
        if let Some(overrides) = overrides {
            for (k, v) in overrides {
                config.insert(k.clone(), v.clone());
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mlmodel_roundtrips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = MlModel::new("pipeflow.pipeline");
        meta.model_file = Some("model.json".into());
        meta.signature = Some(ModelSignature { inputs: vec![ColSpec::new("x", "double")], outputs: vec![] });
        meta.model_config.insert("threshold".into(), json!(0.5));
        meta.write(dir.path()).unwrap();
        assert_eq!(MlModel::read(dir.path()).unwrap(), meta);
    }

    #[test]
    fn overrides_win_over_stored_config() {
        let mut meta = MlModel::new("x");
        meta.model_config.insert("a".into(), json!(1));
        meta.model_config.insert("b".into(), json!(2));
        let overrides = json!({"b": 3}).as_object().cloned().unwrap();
        let merged = meta.merged_config(Some(&overrides));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 3);
    }
}
