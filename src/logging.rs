//! Salida de logs del binario: un subscriber `fmt` de `tracing-subscriber`
//! hacia stderr. Las crates de la librería emiten por `log`; el puente
//! `tracing-log` del subscriber recoge esos registros.
use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_LEVEL;

/// Filtro a partir de `PIPEFLOW_LOG_LEVEL`. Acepta un nivel (`debug`) o
/// directivas completas (`info,pipeflow_steps=debug`); si no parsea, `info`.
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives.trim()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Instala el subscriber global. Falla si ya hay uno instalado.
pub fn init(directives: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt().with_env_filter(env_filter(directives))
                             .with_writer(std::io::stderr)
                             .try_init()
}
