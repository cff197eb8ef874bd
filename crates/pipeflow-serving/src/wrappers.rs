//! Adaptadores de serving y dispatcher `wrap_model`.

use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ServingError;
use crate::mlmodel::ModelSignature;
use crate::model::{ChatMessage, ChatParams, CustomModel, ModelContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Chat,
    Flexible,
    Custom,
}

/// Modelo listo para servir.
pub trait PyFuncModel: Send + Sync {
    fn predict(&self, input: &Value, params: Option<&Map<String, Value>>) -> Result<Value, ServingError>;

    fn signature(&self) -> Option<&ModelSignature>;

    fn kind(&self) -> ModelKind;
}

/// Selecciona el adaptador según las capacidades del modelo. Lo no
/// reconocido cae en el adaptador genérico.
pub fn wrap_model(model: Box<dyn CustomModel>,
                  context: ModelContext,
                  signature: Option<ModelSignature>)
                  -> Box<dyn PyFuncModel> {
    if model.as_chat_model().is_some() {
        debug!("serving model through the chat adapter");
        Box::new(ChatModelWrapper { model, context, signature })
    } else if model.as_flexible_model().is_some() {
        debug!("serving model through the flexible adapter");
        Box::new(FlexibleModelWrapper { model, context, signature })
    } else {
        debug!("serving model through the generic adapter");
        Box::new(CustomModelWrapper { model, context, signature })
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    stop: Option<Vec<String>>,
    n: Option<u32>,
}

pub struct ChatModelWrapper {
    model: Box<dyn CustomModel>,
    context: ModelContext,
    signature: Option<ModelSignature>,
}

impl ChatModelWrapper {
    fn parse(input: &Value) -> Result<(Vec<ChatMessage>, ChatParams), ServingError> {
        let request: ChatRequest = serde_json::from_value(input.clone())
            .map_err(|e| ServingError::InvalidInput(format!("expected a chat request with 'messages': {e}")))?;
        if request.messages.is_empty() {
            return Err(ServingError::InvalidInput("'messages' must not be empty".into()));
        }
        let defaults = ChatParams::default();
        let params = ChatParams { temperature: request.temperature.unwrap_or(defaults.temperature),
                                  max_tokens: request.max_tokens,
                                  stop: request.stop,
                                  n: request.n.unwrap_or(defaults.n) };
        Ok((request.messages, params))
    }
}

impl PyFuncModel for ChatModelWrapper {
    fn predict(&self, input: &Value, _params: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
        let chat = self.model
                       .as_chat_model()
                       .ok_or_else(|| ServingError::InvalidModel("model no longer exposes the chat interface".into()))?;
        let (messages, params) = Self::parse(input)?;
        let response = chat.predict_chat(&self.context, &messages, &params)?;
        Ok(serde_json::to_value(response)?)
    }

    fn signature(&self) -> Option<&ModelSignature> {
        self.signature.as_ref()
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Chat
    }
}

pub struct FlexibleModelWrapper {
    model: Box<dyn CustomModel>,
    context: ModelContext,
    signature: Option<ModelSignature>,
}

impl PyFuncModel for FlexibleModelWrapper {
    fn predict(&self, input: &Value, params: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
        let flexible = self.model
                           .as_flexible_model()
                           .ok_or_else(|| ServingError::InvalidModel("model no longer exposes the flexible interface".into()))?;
        let empty = Map::new();
        flexible.predict_flexible(&self.context, input, params.unwrap_or(&empty))
    }

    fn signature(&self) -> Option<&ModelSignature> {
        self.signature.as_ref()
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Flexible
    }
}

pub struct CustomModelWrapper {
    model: Box<dyn CustomModel>,
    context: ModelContext,
    signature: Option<ModelSignature>,
}

impl PyFuncModel for CustomModelWrapper {
    fn predict(&self, input: &Value, params: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
        if let Some(signature) = &self.signature {
            check_columns(signature, input)?;
        }
        self.model.predict(&self.context, input, params)
    }

    fn signature(&self) -> Option<&ModelSignature> {
        self.signature.as_ref()
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Custom
    }
}

/// Verifica que una entrada tabular (registros o `{columns, data}`) traiga
/// todas las columnas de la firma. Otras formas no se validan.
fn check_columns(signature: &ModelSignature, input: &Value) -> Result<(), ServingError> {
    let required = signature.input_names();
    if required.is_empty() {
        return Ok(());
    }
    let present: Vec<&str> = match input {
        Value::Array(records) => match records.first() {
            Some(Value::Object(first)) => first.keys().map(String::as_str).collect(),
            _ => return Ok(()),
        },
        Value::Object(obj) => match obj.get("columns") {
            Some(Value::Array(cols)) => cols.iter().filter_map(Value::as_str).collect(),
            _ => return Ok(()),
        },
        _ => return Ok(()),
    };
    let missing: Vec<&str> = required.into_iter().filter(|c| !present.contains(c)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServingError::InvalidInput(format!("input is missing required columns: {}", missing.join(", "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlmodel::ColSpec;
    use crate::model::{ChatChoice, ChatModel, ChatResponse, FlexibleModel};
    use serde_json::json;

    struct Echo;

    impl CustomModel for Echo {
        fn predict(&self, _c: &ModelContext, input: &Value, _p: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
            Ok(input.clone())
        }
    }

    struct Parrot;

    impl CustomModel for Parrot {
        fn predict(&self, _c: &ModelContext, _i: &Value, _p: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
            Err(ServingError::Predict("use the chat interface".into()))
        }

        fn as_chat_model(&self) -> Option<&dyn ChatModel> {
            Some(self)
        }
    }

    impl ChatModel for Parrot {
        fn predict_chat(&self, _c: &ModelContext, messages: &[ChatMessage], params: &ChatParams) -> Result<ChatResponse, ServingError> {
            let last = messages.last().cloned().ok_or_else(|| ServingError::InvalidInput("no messages".into()))?;
            Ok(ChatResponse { id: "1".into(),
                              object: "chat.completion".into(),
                              created: 0,
                              model: format!("parrot-t{}", params.temperature),
                              choices: vec![ChatChoice { index: 0,
                                                         message: ChatMessage { role: "assistant".into(), ..last },
                                                         finish_reason: Some("stop".into()) }],
                              usage: None })
        }
    }

    struct Scaled;

    impl CustomModel for Scaled {
        fn predict(&self, _c: &ModelContext, _i: &Value, _p: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
            Err(ServingError::Predict("use the flexible interface".into()))
        }

        fn as_flexible_model(&self) -> Option<&dyn FlexibleModel> {
            Some(self)
        }
    }

    impl FlexibleModel for Scaled {
        fn predict_flexible(&self, _c: &ModelContext, input: &Value, params: &Map<String, Value>) -> Result<Value, ServingError> {
            let factor = params.get("factor").and_then(Value::as_f64).unwrap_or(1.0);
            Ok(json!(input.as_f64().unwrap_or(0.0) * factor))
        }
    }

    #[test]
    fn dispatch_picks_matching_adapter() {
        assert_eq!(wrap_model(Box::new(Echo), ModelContext::default(), None).kind(), ModelKind::Custom);
        assert_eq!(wrap_model(Box::new(Parrot), ModelContext::default(), None).kind(), ModelKind::Chat);
        assert_eq!(wrap_model(Box::new(Scaled), ModelContext::default(), None).kind(), ModelKind::Flexible);
    }

    #[test]
    fn chat_adapter_parses_request() {
        let model = wrap_model(Box::new(Parrot), ModelContext::default(), None);
        let out = model.predict(&json!({"messages": [{"role": "user", "content": "hi"}], "temperature": 0.5}), None)
                       .unwrap();
        assert_eq!(out["choices"][0]["message"]["content"], "hi");
        assert_eq!(out["choices"][0]["message"]["role"], "assistant");
        assert_eq!(out["model"], "parrot-t0.5");
        assert!(matches!(model.predict(&json!({"prompt": "hi"}), None), Err(ServingError::InvalidInput(_))));
    }

    #[test]
    fn flexible_adapter_always_passes_params() {
        let model = wrap_model(Box::new(Scaled), ModelContext::default(), None);
        assert_eq!(model.predict(&json!(2.0), None).unwrap(), json!(2.0));
        let params = json!({"factor": 3.0}).as_object().cloned().unwrap();
        assert_eq!(model.predict(&json!(2.0), Some(&params)).unwrap(), json!(6.0));
    }

    #[test]
    fn generic_adapter_checks_signature_columns() {
        let signature = ModelSignature { inputs: vec![ColSpec::new("a", "double"), ColSpec::new("b", "double")], outputs: vec![] };
        let model = wrap_model(Box::new(Echo), ModelContext::default(), Some(signature));
        assert!(model.predict(&json!([{"a": 1.0, "b": 2.0}]), None).is_ok());
        let err = model.predict(&json!([{"a": 1.0}]), None).unwrap_err();
        assert!(err.to_string().contains("b"));
    }
}
