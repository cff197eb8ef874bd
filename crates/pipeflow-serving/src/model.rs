//! Interfaces de modelo que el dispatcher sabe servir.
//!
//! Todo modelo cargado es un `CustomModel` (llamable genérico). Si además
//! implementa la interfaz conversacional o la flexible, lo anuncia con
//! `as_chat_model` / `as_flexible_model` y `wrap_model` elige el adaptador
//! correspondiente.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServingError;

/// Contexto de carga: artifacts resueltos y configuración efectiva.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelContext {
    pub artifacts: IndexMap<String, PathBuf>,
    pub model_config: Map<String, Value>,
}

pub trait CustomModel: Send + Sync {
    /// Se llama una vez tras construir el modelo, antes de servirlo.
    fn load_context(&mut self, _context: &ModelContext) -> Result<(), ServingError> {
        Ok(())
    }

    fn predict(&self, context: &ModelContext, input: &Value, params: Option<&Map<String, Value>>) -> Result<Value, ServingError>;

    fn as_chat_model(&self) -> Option<&dyn ChatModel> {
        None
    }

    fn as_flexible_model(&self) -> Option<&dyn FlexibleModel> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub n: u32,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self { temperature: 1.0, max_tokens: None, stop: None, n: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Interfaz conversacional: mensajes + parámetros de muestreo.
pub trait ChatModel: Send + Sync {
    fn predict_chat(&self,
                    context: &ModelContext,
                    messages: &[ChatMessage],
                    params: &ChatParams)
                    -> Result<ChatResponse, ServingError>;
}

/// Interfaz extendida: entrada libre + mapping de parámetros siempre presente.
pub trait FlexibleModel: Send + Sync {
    fn predict_flexible(&self, context: &ModelContext, input: &Value, params: &Map<String, Value>) -> Result<Value, ServingError>;
}
