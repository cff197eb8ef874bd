//! Entidades de tracking: `Run` y sus sub-entidades.
//!
//! `Run` es una instantánea de una ejecución: `info` es obligatorio (el tipo
//! lo garantiza), `data` e `inputs` son opcionales. La conversión al formato
//! de wire es simétrica: lo que se escribe con `to_wire` se recupera campo a
//! campo con `from_wire`. Las sub-entidades opcionales ausentes no se
//! escriben y se reconstruyen como presentes-pero-vacías al leer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::wire::{read_string, Decoder, Encoder, WireError};

/// Estado del ciclo de vida de un run (valores del enum del servidor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn code(self) -> u64 {
        match self {
            RunStatus::Running => 1,
            RunStatus::Scheduled => 2,
            RunStatus::Finished => 3,
            RunStatus::Failed => 4,
            RunStatus::Killed => 5,
        }
    }

    pub fn from_code(code: u64) -> Result<Self, WireError> {
        match code {
            1 => Ok(RunStatus::Running),
            2 => Ok(RunStatus::Scheduled),
            3 => Ok(RunStatus::Finished),
            4 => Ok(RunStatus::Failed),
            5 => Ok(RunStatus::Killed),
            value => Err(WireError::InvalidEnum { field: "status", value }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Failed | RunStatus::Killed)
    }
}

/// Metadatos de un run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub user_id: String,
    pub status: RunStatus,
    /// Milisegundos desde epoch.
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub artifact_uri: String,
    pub lifecycle_stage: String,
}

impl RunInfo {
    fn encode(&self, enc: &mut Encoder) {
        // run_uuid (1) se mantiene por compatibilidad con lectores antiguos.
        enc.string(1, &self.run_id)
           .string(2, &self.experiment_id)
           .string(3, &self.run_name)
           .string(6, &self.user_id)
           .varint(7, self.status.code())
           .int64(8, self.start_time);
        if let Some(end) = self.end_time {
            enc.int64(9, end);
        }
        enc.string(13, &self.artifact_uri)
           .string(14, &self.lifecycle_stage)
           .string(15, &self.run_id);
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut dec = Decoder::new(bytes);
        let mut run_uuid = None;
        let mut run_id = None;
        let mut info = RunInfo { run_id: String::new(),
                                 run_name: String::new(),
                                 experiment_id: String::new(),
                                 user_id: String::new(),
                                 status: RunStatus::Running,
                                 start_time: 0,
                                 end_time: None,
                                 artifact_uri: String::new(),
                                 lifecycle_stage: String::new() };
        while let Some((field, value)) = dec.next_field()? {
            match field {
                1 => run_uuid = Some(read_string(field, &value)?),
                2 => info.experiment_id = read_string(field, &value)?,
                3 => info.run_name = read_string(field, &value)?,
                6 => info.user_id = read_string(field, &value)?,
                7 => info.status = RunStatus::from_code(value.as_u64().unwrap_or(0))?,
                8 => info.start_time = value.as_i64().unwrap_or_default(),
                9 => info.end_time = value.as_i64(),
                13 => info.artifact_uri = read_string(field, &value)?,
                14 => info.lifecycle_stage = read_string(field, &value)?,
                15 => run_id = Some(read_string(field, &value)?),
                _ => {}
            }
        }
        info.run_id = run_id.or(run_uuid).ok_or(WireError::MissingField("run_id"))?;
        Ok(info)
    }

    fn to_mapping(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("run_id".into(), json!(self.run_id));
        map.insert("run_uuid".into(), json!(self.run_id));
        map.insert("run_name".into(), json!(self.run_name));
        map.insert("experiment_id".into(), json!(self.experiment_id));
        map.insert("user_id".into(), json!(self.user_id));
        map.insert("status".into(), json!(self.status.as_str()));
        map.insert("start_time".into(), json!(self.start_time));
        map.insert("end_time".into(), json!(self.end_time));
        map.insert("artifact_uri".into(), json!(self.artifact_uri));
        map.insert("lifecycle_stage".into(), json!(self.lifecycle_stage));
        map
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTag {
    pub key: String,
    pub value: String,
}

impl RunTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

fn encode_pair(enc: &mut Encoder, key: &str, value: &str) {
    enc.string(1, key).string(2, value);
}

fn decode_pair(bytes: &[u8]) -> Result<(String, String), WireError> {
    let mut dec = Decoder::new(bytes);
    let (mut key, mut value) = (String::new(), String::new());
    while let Some((field, v)) = dec.next_field()? {
        match field {
            1 => key = read_string(field, &v)?,
            2 => value = read_string(field, &v)?,
            _ => {}
        }
    }
    Ok((key, value))
}

/// Métricas, parámetros y tags de un run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    pub metrics: Vec<Metric>,
    pub params: Vec<Param>,
    pub tags: Vec<RunTag>,
}

impl RunData {
    /// Último valor registrado por clave (mayor `step`, luego mayor
    /// `timestamp`).
    pub fn metric_values(&self) -> IndexMap<String, f64> {
        let mut latest: IndexMap<String, &Metric> = IndexMap::new();
        for m in &self.metrics {
            match latest.get(&m.key) {
                Some(prev) if (prev.step, prev.timestamp) > (m.step, m.timestamp) => {}
                _ => {
                    latest.insert(m.key.clone(), m);
                }
            }
        }
        latest.into_iter().map(|(k, m)| (k, m.value)).collect()
    }

    pub fn param_values(&self) -> IndexMap<String, String> {
        self.params.iter().map(|p| (p.key.clone(), p.value.clone())).collect()
    }

    pub fn tag_values(&self) -> IndexMap<String, String> {
        self.tags.iter().map(|t| (t.key.clone(), t.value.clone())).collect()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().rev().find(|t| t.key == key).map(|t| t.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.params.is_empty() && self.tags.is_empty()
    }

    fn encode(&self, enc: &mut Encoder) {
        for m in &self.metrics {
            enc.message(1, |e| {
                   e.string(1, &m.key).double(2, m.value).int64(3, m.timestamp).int64(4, m.step);
               });
        }
        for p in &self.params {
            enc.message(2, |e| encode_pair(e, &p.key, &p.value));
        }
        for t in &self.tags {
            enc.message(3, |e| encode_pair(e, &t.key, &t.value));
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut data = RunData::default();
        let mut dec = Decoder::new(bytes);
        while let Some((field, value)) = dec.next_field()? {
            let Some(inner) = value.as_bytes() else { continue };
            match field {
                1 => data.metrics.push(decode_metric(inner)?),
                2 => {
                    let (key, value) = decode_pair(inner)?;
                    data.params.push(Param { key, value });
                }
                3 => {
                    let (key, value) = decode_pair(inner)?;
                    data.tags.push(RunTag { key, value });
                }
                _ => {}
            }
        }
        Ok(data)
    }

    pub fn to_mapping(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("metrics".into(), json!(self.metric_values()));
        map.insert("params".into(), json!(self.param_values()));
        map.insert("tags".into(), json!(self.tag_values()));
        map
    }
}

fn decode_metric(bytes: &[u8]) -> Result<Metric, WireError> {
    let mut dec = Decoder::new(bytes);
    let mut metric = Metric { key: String::new(), value: 0.0, timestamp: 0, step: 0 };
    while let Some((field, value)) = dec.next_field()? {
        match field {
            1 => metric.key = read_string(field, &value)?,
            2 => metric.value = value.as_f64().unwrap_or_default(),
            3 => metric.timestamp = value.as_i64().unwrap_or_default(),
            4 => metric.step = value.as_i64().unwrap_or_default(),
            _ => {}
        }
    }
    Ok(metric)
}

/// Referencia a un dataset consumido por el run (linaje).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub digest: String,
    pub source_type: String,
    pub source: String,
    pub schema: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInput {
    pub tags: Vec<InputTag>,
    pub dataset: Dataset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInputs {
    pub dataset_inputs: Vec<DatasetInput>,
}

impl RunInputs {
    fn encode(&self, enc: &mut Encoder) {
        for input in &self.dataset_inputs {
            enc.message(1, |e| {
                   for tag in &input.tags {
                       e.message(1, |t| encode_pair(t, &tag.key, &tag.value));
                   }
                   e.message(2, |d| {
                        let ds = &input.dataset;
                        d.string(1, &ds.name).string(2, &ds.digest).string(3, &ds.source_type).string(4, &ds.source);
                        if let Some(schema) = &ds.schema {
                            d.string(5, schema);
                        }
                        if let Some(profile) = &ds.profile {
                            d.string(6, profile);
                        }
                    });
               });
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut inputs = RunInputs::default();
        let mut dec = Decoder::new(bytes);
        while let Some((field, value)) = dec.next_field()? {
            if field != 1 {
                continue;
            }
            let Some(inner) = value.as_bytes() else { continue };
            let mut tags = Vec::new();
            let mut dataset = None;
            let mut di = Decoder::new(inner);
            while let Some((f, v)) = di.next_field()? {
                let Some(b) = v.as_bytes() else { continue };
                match f {
                    1 => {
                        let (key, value) = decode_pair(b)?;
                        tags.push(InputTag { key, value });
                    }
                    2 => dataset = Some(decode_dataset(b)?),
                    _ => {}
                }
            }
            inputs.dataset_inputs.push(DatasetInput { tags,
                                                      dataset: dataset.ok_or(WireError::MissingField("dataset"))? });
        }
        Ok(inputs)
    }

    pub fn to_mapping(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let items: Vec<Value> = self.dataset_inputs
                                    .iter()
                                    .map(|di| {
                                        json!({
                                            "tags": di.tags.iter().map(|t| json!({"key": t.key, "value": t.value})).collect::<Vec<_>>(),
                                            "dataset": di.dataset,
                                        })
                                    })
                                    .collect();
        map.insert("dataset_inputs".into(), Value::Array(items));
        map
    }
}

fn decode_dataset(bytes: &[u8]) -> Result<Dataset, WireError> {
    let mut ds = Dataset::default();
    let mut dec = Decoder::new(bytes);
    while let Some((field, value)) = dec.next_field()? {
        match field {
            1 => ds.name = read_string(field, &value)?,
            2 => ds.digest = read_string(field, &value)?,
            3 => ds.source_type = read_string(field, &value)?,
            4 => ds.source = read_string(field, &value)?,
            5 => ds.schema = Some(read_string(field, &value)?),
            6 => ds.profile = Some(read_string(field, &value)?),
            _ => {}
        }
    }
    Ok(ds)
}

/// Agregado de una ejecución. Posee exclusivamente `info`, `data` e `inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub info: RunInfo,
    pub data: Option<RunData>,
    pub inputs: Option<RunInputs>,
}

impl Run {
    pub fn new(info: RunInfo, data: Option<RunData>, inputs: Option<RunInputs>) -> Self {
        Self { info, data, inputs }
    }

    pub fn data_or_empty(&self) -> RunData {
        self.data.clone().unwrap_or_default()
    }

    /// Serializa el run al mensaje binario `Run { info=1, data=2, inputs=3 }`.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.message(1, |e| self.info.encode(e));
        if let Some(data) = &self.data {
            enc.message(2, |e| data.encode(e));
        }
        if let Some(inputs) = &self.inputs {
            enc.message(3, |e| inputs.encode(e));
        }
        enc.into_bytes()
    }

    /// Reconstruye un run. `info` ausente es un error; `data`/`inputs`
    /// ausentes se devuelven vacíos.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WireError> {
        let mut dec = Decoder::new(bytes);
        let mut info = None;
        let mut data = RunData::default();
        let mut inputs = RunInputs::default();
        while let Some((field, value)) = dec.next_field()? {
            let Some(inner) = value.as_bytes() else { continue };
            match field {
                1 => info = Some(RunInfo::decode(inner)?),
                2 => data = RunData::decode(inner)?,
                3 => inputs = RunInputs::decode(inner)?,
                _ => {}
            }
        }
        let info = info.ok_or(WireError::MissingField("info"))?;
        Ok(Run { info, data: Some(data), inputs: Some(inputs) })
    }

    /// `info` se vuelca tal cual; `data` e `inputs` se anidan bajo su clave y
    /// se omiten cuando faltan.
    pub fn to_mapping(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("info".into(), Value::Object(self.info.to_mapping()));
        if let Some(data) = &self.data {
            map.insert("data".into(), Value::Object(data.to_mapping()));
        }
        if let Some(inputs) = &self.inputs {
            map.insert("inputs".into(), Value::Object(inputs.to_mapping()));
        }
        map
    }
}
