//! Resolución de artifacts entre steps.
//!
//! Layout: `<pipeline_root>/steps/<step_name>/outputs/<relative_path>`. El
//! `ArtifactLocator` sólo calcula rutas; nunca escribe. Un downstream que
//! resuelve un artifact ausente recibe `UpstreamMissing` y debe abortar.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{CARD_FILE, OUTPUTS_DIR, STEPS_DIR};
use crate::errors::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    root: PathBuf,
}

impl ArtifactLocator {
    pub fn new(pipeline_root: impl Into<PathBuf>) -> Self {
        Self { root: pipeline_root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn step_dir(&self, step_name: &str) -> PathBuf {
        self.root.join(STEPS_DIR).join(step_name)
    }

    pub fn output_dir(&self, step_name: &str) -> PathBuf {
        self.step_dir(step_name).join(OUTPUTS_DIR)
    }

    pub fn card_path(&self, step_name: &str) -> PathBuf {
        self.step_dir(step_name).join(CARD_FILE)
    }

    /// Ruta determinista de un artifact, exista o no.
    pub fn path(&self, step_name: &str, relative_path: &str) -> PathBuf {
        self.output_dir(step_name).join(relative_path)
    }

    /// Igual que `path` pero falla si el step upstream no lo produjo.
    pub fn resolve(&self, step_name: &str, relative_path: &str) -> Result<PathBuf, PipelineError> {
        let path = self.path(step_name, relative_path);
        if path.exists() {
            Ok(path)
        } else {
            Err(PipelineError::UpstreamMissing { step: step_name.to_string(),
                                                 path: relative_path.to_string() })
        }
    }
}

/// Archivo producido por un step, identificado por su hash de contenido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub step_name: String,
    /// Relativo al directorio de outputs del step, con separador `/`.
    pub relative_path: String,
    /// blake3 del contenido.
    pub hash: String,
}
