//! Pipeline de inferencia: transformador ajustado + estimador ajustado.
//!
//! Se persiste como `model/model.json` (componentes guardados y columnas) más
//! `model/MLmodel` con loader `pipeflow.pipeline`, de modo que el modelo
//! entrenado se sirve con `load_pyfunc`.

use std::fs;
use std::path::{Path, PathBuf};

use pipeflow_core::capability::{Estimator, SavedComponent, Transformed, Transformer};
use pipeflow_core::{Components, Frame, PipelineError};
use pipeflow_serving::{ColSpec, CustomModel, MlModel, ModelContext, ModelRegistry, ModelSignature, ServingError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MODEL_DIR: &str = "model";
pub const MODEL_FILE: &str = "model.json";
pub const PIPELINE_LOADER: &str = "pipeflow.pipeline";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPipeline {
    pub feature_columns: Vec<String>,
    pub transformed_columns: Vec<String>,
    pub target_col: String,
    pub transformer: SavedComponent,
    pub estimator: SavedComponent,
}

pub struct InferencePipeline {
    feature_columns: Vec<String>,
    transformed_columns: Vec<String>,
    target_col: String,
    transformer: Box<dyn Transformer>,
    estimator: Box<dyn Estimator>,
}

impl std::fmt::Debug for InferencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePipeline")
         .field("transformer", &self.transformer.kind())
         .field("estimator", &self.estimator.kind())
         .field("feature_columns", &self.feature_columns)
         .finish()
    }
}

impl InferencePipeline {
    pub fn new(feature_columns: Vec<String>,
               transformed_columns: Vec<String>,
               target_col: impl Into<String>,
               transformer: Box<dyn Transformer>,
               estimator: Box<dyn Estimator>)
               -> Self {
        Self { feature_columns, transformed_columns, target_col: target_col.into(), transformer, estimator }
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn target_col(&self) -> &str {
        &self.target_col
    }

    pub fn estimator(&self) -> &dyn Estimator {
        self.estimator.as_ref()
    }

    pub fn transformer(&self) -> &dyn Transformer {
        self.transformer.as_ref()
    }

    /// Predice sobre datos crudos; columnas extra (p. ej. el target) se
    /// ignoran, las faltantes son error.
    pub fn predict(&self, raw: &Frame) -> Result<Vec<f64>, PipelineError> {
        let selected = self.feature_columns
                           .iter()
                           .map(|c| Ok((c.clone(), raw.column(c)?)))
                           .collect::<Result<Vec<_>, PipelineError>>()?;
        let features = if selected.is_empty() {
            Frame::new(Vec::new(), vec![Vec::new(); raw.n_rows()])?
        } else {
            Frame::from_columns(selected)?
        };
        let transformed = match self.transformer.transform(&features)? {
            Transformed::Table(frame) => frame,
            Transformed::Matrix { rows, .. } => Frame::new(self.transformed_columns.clone(), rows)?,
        };
        self.estimator.predict(&transformed)
    }

    pub fn describe(&self) -> String {
        format!("Pipeline(steps=[\n  {},\n  {}\n])", self.transformer.describe(), self.estimator.describe())
    }

    pub fn signature(&self) -> ModelSignature {
        ModelSignature { inputs: self.feature_columns.iter().map(|c| ColSpec::new(c.clone(), "double")).collect(),
                         outputs: vec![ColSpec { name: None, dtype: "double".to_string() }] }
    }

    pub fn to_saved(&self) -> Result<SavedPipeline, PipelineError> {
        Ok(SavedPipeline { feature_columns: self.feature_columns.clone(),
                           transformed_columns: self.transformed_columns.clone(),
                           target_col: self.target_col.clone(),
                           transformer: self.transformer.save()?,
                           estimator: self.estimator.save()? })
    }

    /// Escribe `model.json` y `MLmodel` en `model_dir`.
    pub fn save(&self, model_dir: &Path, run_id: Option<&str>) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(model_dir)?;
        let path = model_dir.join(MODEL_FILE);
        fs::write(&path, serde_json::to_vec_pretty(&self.to_saved()?)?)?;

        let mut meta = MlModel::new(PIPELINE_LOADER);
        meta.model_file = Some(MODEL_FILE.to_string());
        meta.signature = Some(self.signature());
        meta.run_id = run_id.map(str::to_string);
        meta.write(model_dir).map_err(|e| PipelineError::Serialization(e.to_string()))?;
        Ok(path)
    }

    pub fn from_saved(saved: SavedPipeline, components: &Components) -> Result<Self, PipelineError> {
        Ok(Self { transformer: components.restore_transformer(&saved.transformer)?,
                  estimator: components.restore_estimator(&saved.estimator)?,
                  feature_columns: saved.feature_columns,
                  transformed_columns: saved.transformed_columns,
                  target_col: saved.target_col })
    }

    pub fn load(model_dir: &Path, components: &Components) -> Result<Self, PipelineError> {
        let saved: SavedPipeline = serde_json::from_slice(&fs::read(model_dir.join(MODEL_FILE))?)?;
        Self::from_saved(saved, components)
    }
}

/// Convierte una entrada JSON en `Frame`. Acepta registros
/// (`[{"a": 1.0}, ...]`) u orientación split (`{"columns": [...], "data": [[...]]}`).
pub fn frame_from_json(input: &Value) -> Result<Frame, PipelineError> {
    match input {
        Value::Array(records) => {
            let Some(Value::Object(first)) = records.first() else {
                return Err(PipelineError::Data("expected a non-empty list of records".into()));
            };
            let columns: Vec<String> = first.keys().cloned().collect();
            let mut rows = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let obj = record.as_object().ok_or_else(|| PipelineError::Data(format!("record {i} is not an object")))?;
                rows.push(columns.iter().map(|c| obj.get(c).and_then(Value::as_f64).unwrap_or(f64::NAN)).collect());
            }
            Frame::new(columns, rows)
        }
        Value::Object(obj) => {
            let columns: Vec<String> = serde_json::from_value(obj.get("columns").cloned().unwrap_or(Value::Null))
                .map_err(|e| PipelineError::Data(format!("'columns' must be a list of names: {e}")))?;
            let data: Vec<Vec<Option<f64>>> = serde_json::from_value(obj.get("data").cloned().unwrap_or(Value::Null))
                .map_err(|e| PipelineError::Data(format!("'data' must be a list of numeric rows: {e}")))?;
            let rows = data.into_iter().map(|r| r.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()).collect();
            Frame::new(columns, rows)
        }
        other => Err(PipelineError::Data(format!("unsupported input: {other}"))),
    }
}

/// Modelo servible que envuelve un `InferencePipeline`.
pub struct PipelineModel {
    pipeline: InferencePipeline,
}

impl PipelineModel {
    pub fn new(pipeline: InferencePipeline) -> Self {
        Self { pipeline }
    }
}

impl CustomModel for PipelineModel {
    fn predict(&self, _context: &ModelContext, input: &Value, _params: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
        let frame = frame_from_json(input).map_err(|e| ServingError::InvalidInput(e.to_string()))?;
        let predictions = self.pipeline.predict(&frame).map_err(|e| ServingError::Predict(e.to_string()))?;
        Ok(Value::from(predictions.into_iter().map(|p| if p.is_finite() { Value::from(p) } else { Value::Null }).collect::<Vec<_>>()))
    }
}

/// Registra el loader `pipeflow.pipeline` usando `components` para
/// restaurar transformador y estimador.
pub fn register_pipeline_loader(registry: &mut ModelRegistry, components: Components) {
    registry.register(PIPELINE_LOADER, move |dir: &Path, meta: &MlModel, _ctx: &ModelContext| {
                let file = meta.model_file.as_deref().unwrap_or(MODEL_FILE);
                let bytes = fs::read(dir.join(file))?;
                let saved: SavedPipeline = serde_json::from_slice(&bytes)?;
                let pipeline = InferencePipeline::from_saved(saved, &components).map_err(|e| ServingError::InvalidModel(e.to_string()))?;
                let model: Box<dyn CustomModel> = Box::new(PipelineModel::new(pipeline));
                Ok(model)
            });
}
