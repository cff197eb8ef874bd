//! pipeflow: driver de línea de comandos del pipeline de regresión.
//!
//! - `config`: configuración de la aplicación desde el entorno (.env).
//! - `logging`: logger de stderr para la fachada `log`.
//! - `commands`: implementación de los subcomandos `run`, `inspect`,
//!   `predict` y `show-run`.

pub mod commands;
pub mod config;
pub mod logging;
