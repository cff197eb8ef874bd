use std::path::Path;

use serde_json::Value;

use crate::card::Card;
use crate::errors::PipelineError;
use crate::model::StepContext;

/// Unidad de trabajo del pipeline.
///
/// `run` lee artifacts upstream vía `ctx.locator`, escribe sólo dentro de
/// `output_dir` (que el engine entrega limpio) y devuelve la card. Con las
/// mismas entradas produce los mismos artifacts primarios.
pub trait PipelineStep: Send {
    /// Identificador estable; namespacing de artifacts.
    fn name(&self) -> &str;

    /// Parámetros deterministas del step (entran al fingerprint).
    fn params(&self) -> Value {
        Value::Null
    }

    fn run(&self, ctx: &StepContext, output_dir: &Path) -> Result<Card, PipelineError>;
}
