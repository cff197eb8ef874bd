//! pipeflow-serving: interfaces de modelo, adaptadores de serving y carga de
//! modelos guardados.
pub mod error;
pub mod loader;
pub mod mlmodel;
pub mod model;
pub mod registry;
pub mod wrappers;

pub use error::ServingError;
pub use loader::load_pyfunc;
pub use mlmodel::{ColSpec, MlModel, ModelSignature, MLMODEL_FILE};
pub use model::{ChatChoice, ChatMessage, ChatModel, ChatParams, ChatResponse, CustomModel, FlexibleModel, ModelContext, TokenUsage};
pub use registry::{ModelLoader, ModelRegistry};
pub use wrappers::{wrap_model, ChatModelWrapper, CustomModelWrapper, FlexibleModelWrapper, ModelKind, PyFuncModel};
