//! Errores del servicio de tracking.
//! Mapea fallos de IO / formato a variantes semánticas.

use thiserror::Error;

use crate::wire::WireError;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("run not found: {0}")]
    NotFound(String),
    #[error("param '{key}' already logged with value '{existing}' (new value '{new}')")]
    ParamConflict { key: String, existing: String, new: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("wire format: {0}")]
    Wire(#[from] WireError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("unsupported tracking uri: {0}")]
    UnsupportedUri(String),
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
