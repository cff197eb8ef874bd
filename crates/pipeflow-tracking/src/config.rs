//! Configuración del servicio de tracking desde variables de entorno.
//! Convención: `PIPEFLOW_TRACKING_URI` (`memory:`, `file:<dir>` o ruta).

use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::TrackingError;
use crate::file_store::FileTrackingStore;
use crate::store::{InMemoryTrackingStore, TrackingStore};

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_TRACKING_URI: &str = "file:./mlruns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    pub tracking_uri: String,
    /// Experimento usado cuando el pipeline no declara `experiment.name`.
    pub experiment_name: Option<String>,
}

impl TrackingConfig {
    pub fn new(tracking_uri: impl Into<String>) -> Self {
        Self { tracking_uri: tracking_uri.into(), experiment_name: None }
    }

    /// Lee `PIPEFLOW_TRACKING_URI` y `PIPEFLOW_EXPERIMENT_NAME` con la
    /// función dada; valores vacíos cuentan como ausentes.
    pub fn from_lookup<F>(lookup: F) -> Self
        where F: Fn(&str) -> Option<String>
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self { tracking_uri: get("PIPEFLOW_TRACKING_URI").unwrap_or_else(|| DEFAULT_TRACKING_URI.to_string()),
               experiment_name: get("PIPEFLOW_EXPERIMENT_NAME") }
    }

    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn open_store(&self) -> Result<Arc<dyn TrackingStore>, TrackingError> {
        open_store(&self.tracking_uri)
    }
}

/// Abre el store correspondiente al esquema de la URI.
pub fn open_store(uri: &str) -> Result<Arc<dyn TrackingStore>, TrackingError> {
    if uri == "memory:" || uri == "memory://" {
        return Ok(Arc::new(InMemoryTrackingStore::new()));
    }
    let path = match uri.split_once(':') {
        Some(("file", rest)) => rest.trim_start_matches("//"),
        Some((scheme, _)) if scheme.len() > 1 => return Err(TrackingError::UnsupportedUri(uri.to_string())),
        _ => uri,
    };
    if path.is_empty() {
        return Err(TrackingError::UnsupportedUri(uri.to_string()));
    }
    Ok(Arc::new(FileTrackingStore::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(matches!(open_store("databricks://x"), Err(TrackingError::UnsupportedUri(_))));
    }

    #[test]
    fn lookup_falls_back_to_default_uri() {
        let cfg = TrackingConfig::from_lookup(|k| (k == "PIPEFLOW_EXPERIMENT_NAME").then(|| "houses".to_string()));
        assert_eq!(cfg.tracking_uri, DEFAULT_TRACKING_URI);
        assert_eq!(cfg.experiment_name.as_deref(), Some("houses"));
        let cfg = TrackingConfig::from_lookup(|_| Some(" ".to_string()));
        assert_eq!(cfg.experiment_name, None);
    }

    #[test]
    fn file_scheme_opens_directory() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("file:{}", dir.path().join("mlruns").display());
        let store = open_store(&uri).unwrap();
        assert_eq!(store.get_or_create_experiment("x").unwrap(), "0");
        assert!(dir.path().join("mlruns").is_dir());
    }
}
