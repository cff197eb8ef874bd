//! Carga de un modelo guardado listo para servir.

use std::path::Path;

use log::info;
use serde_json::{Map, Value};

use crate::error::ServingError;
use crate::mlmodel::MlModel;
use crate::model::ModelContext;
use crate::registry::ModelRegistry;
use crate::wrappers::{wrap_model, PyFuncModel};

/// Lee `MLmodel`, aplica `model_config` sobre la configuración guardada,
/// resuelve los artifacts relativos al directorio, construye el modelo con el
/// loader registrado y lo envuelve con el adaptador que le corresponde.
pub fn load_pyfunc(model_dir: &Path,
                   model_config: Option<&Map<String, Value>>,
                   registry: &ModelRegistry)
                   -> Result<Box<dyn PyFuncModel>, ServingError> {
    let meta = MlModel::read(model_dir)?;
    let mut context = ModelContext { artifacts: Default::default(), model_config: meta.merged_config(model_config) };
    for (name, relative) in &meta.artifacts {
        let path = model_dir.join(relative);
        if !path.exists() {
            return Err(ServingError::InvalidModel(format!("artifact '{name}' not found at {}", path.display())));
        }
        context.artifacts.insert(name.clone(), path);
    }

    let loader = registry.get(&meta.loader_module)?;
    let mut model = loader(model_dir, &meta, &context)?;
    model.load_context(&context)?;
    info!("loaded model from {} with loader '{}'", model_dir.display(), meta.loader_module);
    Ok(wrap_model(model, context, meta.signature.clone()))
}
