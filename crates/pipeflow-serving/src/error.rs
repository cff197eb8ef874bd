use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServingError {
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("no loader registered for '{0}'")]
    UnknownLoader(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("prediction failed: {0}")]
    Predict(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
