//! Loaders de modelos por nombre (`loader_module` del `MLmodel`).

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ServingError;
use crate::mlmodel::MlModel;
use crate::model::{CustomModel, ModelContext};

/// `(directorio del modelo, metadatos, contexto) -> modelo`.
pub type ModelLoader =
    Arc<dyn Fn(&Path, &MlModel, &ModelContext) -> Result<Box<dyn CustomModel>, ServingError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModelRegistry {
    loaders: IndexMap<String, ModelLoader>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry").field("loaders", &self.loaders.keys().collect::<Vec<_>>()).finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self,
                    loader_module: impl Into<String>,
                    loader: impl Fn(&Path, &MlModel, &ModelContext) -> Result<Box<dyn CustomModel>, ServingError>
                        + Send
                        + Sync
                        + 'static)
                    -> &mut Self {
        self.loaders.insert(loader_module.into(), Arc::new(loader));
        self
    }

    pub fn get(&self, loader_module: &str) -> Result<ModelLoader, ServingError> {
        self.loaders.get(loader_module).cloned().ok_or_else(|| ServingError::UnknownLoader(loader_module.to_string()))
    }

    pub fn loader_modules(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }
}
