use serde_json::{Map, Value, json};

use crate::core::error::ProviderError;
use crate::core::types::{
    CallShape, ModelTarget, NormalizedResponse, ProviderCall, ProviderKind, ToolCall, ToolChoice,
    ToolEntry, Usage,
};
use crate::dialect::strip_code_fences;
use crate::providers::translator_contract::ProviderTranslator;

/// Body fields owned by the encoder. Passthrough values for these keys are
/// dropped. A passthrough `response_format` survives only when the call shape
/// sets none.
const RESERVED_FIELDS: &[&str] = &["model", "models", "messages", "tools", "tool_choice", "stream"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GatewayErrorEnvelope {
    pub code: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GatewayDecodeEnvelope {
    pub body: Value,
    pub provider: ProviderKind,
    pub shape: CallShape,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GatewayTranslator;

impl ProviderTranslator for GatewayTranslator {
    type RequestPayload = Value;
    type ResponsePayload = GatewayDecodeEnvelope;

    fn encode_request(&self, call: &ProviderCall) -> Result<Self::RequestPayload, ProviderError> {
        encode_gateway_request(call)
    }

    fn decode_response(
        &self,
        payload: &Self::ResponsePayload,
    ) -> Result<NormalizedResponse, ProviderError> {
        decode_gateway_response(payload)
    }
}

/// Encodes a call as an OpenAI-style chat completion body. The body carries
/// either `model` or a non-empty `models`, never both.
pub(crate) fn encode_gateway_request(call: &ProviderCall) -> Result<Value, ProviderError> {
    let model = call.target.primary();
    if model.trim().is_empty() {
        return Err(protocol_error(call.provider, None, "resolved model id is empty"));
    }
    if call.messages.is_empty() {
        return Err(protocol_error(call.provider, Some(model), "empty messages"));
    }

    let mut body = Map::new();
    for (key, value) in &call.passthrough {
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            body.insert(key.clone(), value.clone());
        }
    }

    match &call.target {
        ModelTarget::Single(model) => {
            body.insert("model".to_string(), Value::String(model.clone()));
        }
        ModelTarget::Candidates(models) => {
            body.insert("models".to_string(), json!(models));
        }
    }

    body.insert("messages".to_string(), to_json(call, &call.messages)?);
    body.insert("stream".to_string(), Value::Bool(false));

    if !call.tools.is_empty() {
        let tools = call.tools.iter().map(map_tool).collect::<Vec<_>>();
        body.insert("tools".to_string(), Value::Array(tools));
    }

    if let Some(tool_choice) = call.tool_choice {
        let choice = match tool_choice {
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        };
        body.insert("tool_choice".to_string(), Value::String(choice.to_string()));
    }

    if let Some(response_format) = map_response_format(&call.shape) {
        body.insert("response_format".to_string(), response_format);
    }

    if let Some(reasoning_effort) = &call.reasoning_effort {
        body.insert("reasoning_effort".to_string(), json!(reasoning_effort));
    }
    if let Some(seed) = call.seed {
        body.insert("seed".to_string(), json!(seed));
    }
    if let Some(temperature) = call.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = call.top_p {
        body.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = call.max_tokens {
        body.insert("max_tokens".to_string(), json!(max_tokens));
    }

    Ok(Value::Object(body))
}

/// Bare action names are resolved by the caller; upstream they travel as
/// parameterless functions.
fn map_tool(tool: &ToolEntry) -> Value {
    match tool {
        ToolEntry::Named(name) => json!({
            "type": "function",
            "function": {
                "name": name,
                "parameters": { "type": "object", "properties": {} }
            }
        }),
        ToolEntry::Definition(definition) => {
            serde_json::to_value(definition).unwrap_or_else(|_| json!({ "type": definition.kind }))
        }
    }
}

fn map_response_format(shape: &CallShape) -> Option<Value> {
    match shape {
        CallShape::Object {
            name,
            schema,
            strict,
        } => Some(json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": strict
            }
        })),
        CallShape::NoSchemaObject => Some(json!({ "type": "json_object" })),
        CallShape::Text | CallShape::SchemaInstructions { .. } => None,
    }
}

pub(crate) fn decode_gateway_response(
    payload: &GatewayDecodeEnvelope,
) -> Result<NormalizedResponse, ProviderError> {
    let provider = payload.provider;
    let root = payload.body.as_object().ok_or_else(|| {
        protocol_error(provider, None, "gateway response payload must be a JSON object")
    })?;

    if let Some(error) = parse_gateway_error_value(root) {
        let message = format_gateway_error_message(&error);
        return Err(match error.code {
            Some(status_code @ (401 | 403)) => ProviderError::CredentialsRejected {
                provider,
                status_code,
                request_id: None,
                message,
            },
            _ => protocol_error(provider, None, message),
        });
    }

    let model = root
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("<unknown-model>")
        .to_string();

    let choice = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(Value::as_object)
        .ok_or_else(|| {
            protocol_error(provider, Some(&model), "gateway response missing choices[0]")
        })?;

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    if finish_reason.as_deref() == Some("error") {
        return Err(protocol_error(
            provider,
            Some(&model),
            "gateway response finish_reason was error",
        ));
    }

    let message = choice
        .get("message")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            protocol_error(provider, Some(&model), "gateway response missing choice message")
        })?;

    let text = decode_message_text(message.get("content"), provider, &model)?;
    let tool_calls = decode_tool_calls(message.get("tool_calls"), provider, &model)?;
    let usage = decode_usage(root.get("usage"));
    let object = decode_object(&payload.shape, text.as_deref(), provider, &model)?;

    Ok(NormalizedResponse {
        status: 200,
        provider,
        model,
        text,
        object,
        tool_calls,
        usage,
        finish_reason,
        body: payload.body.clone(),
    })
}

pub(crate) fn parse_gateway_error_envelope(body: &str) -> Option<GatewayErrorEnvelope> {
    let payload = serde_json::from_str::<Value>(body).ok()?;
    parse_gateway_error_value(payload.as_object()?)
}

pub(crate) fn format_gateway_error_message(envelope: &GatewayErrorEnvelope) -> String {
    match envelope.code {
        Some(code) => format!("gateway error: {} [code={code}]", envelope.message),
        None => format!("gateway error: {}", envelope.message),
    }
}

fn decode_message_text(
    value: Option<&Value>,
    provider: ProviderKind,
    model: &str,
) -> Result<Option<String>, ProviderError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Array(items)) => {
            let mut parts = Vec::new();
            for item in items {
                if item.get("type").and_then(Value::as_str) == Some("text") {
                    let text = item.get("text").and_then(Value::as_str).ok_or_else(|| {
                        protocol_error(provider, Some(model), "text content item missing text")
                    })?;
                    parts.push(text);
                }
            }
            Ok((!parts.is_empty()).then(|| parts.join("\n")))
        }
        Some(_) => Err(protocol_error(
            provider,
            Some(model),
            "assistant content must be string, array, or null",
        )),
    }
}

fn decode_tool_calls(
    value: Option<&Value>,
    provider: ProviderKind,
    model: &str,
) -> Result<Vec<ToolCall>, ProviderError> {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return Ok(Vec::new());
    };

    let calls = value
        .as_array()
        .ok_or_else(|| protocol_error(provider, Some(model), "tool_calls must be an array"))?;

    calls
        .iter()
        .map(|call| {
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| protocol_error(provider, Some(model), "tool_call missing id"))?;
            let function = call
                .get("function")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    protocol_error(provider, Some(model), "tool_call missing function object")
                })?;
            let name = function.get("name").and_then(Value::as_str).ok_or_else(|| {
                protocol_error(provider, Some(model), "tool_call function missing name")
            })?;
            let arguments = match function.get("arguments") {
                Some(Value::String(arguments)) => arguments.clone(),
                Some(other) => other.to_string(),
                None => "{}".to_string(),
            };

            Ok(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

fn decode_usage(value: Option<&Value>) -> Usage {
    let Some(usage) = value.and_then(Value::as_object) else {
        return Usage::default();
    };

    Usage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
    }
}

/// Native object shapes return JSON in the message text.
fn decode_object(
    shape: &CallShape,
    text: Option<&str>,
    provider: ProviderKind,
    model: &str,
) -> Result<Option<Value>, ProviderError> {
    if !matches!(shape, CallShape::Object { .. } | CallShape::NoSchemaObject) {
        return Ok(None);
    }

    let Some(text) = text.filter(|text| !text.trim().is_empty()) else {
        return Ok(None);
    };

    serde_json::from_str(strip_code_fences(text))
        .map(Some)
        .map_err(|error| {
            protocol_error(
                provider,
                Some(model),
                format!("object output is not valid JSON: {error}"),
            )
        })
}

fn parse_gateway_error_value(root: &Map<String, Value>) -> Option<GatewayErrorEnvelope> {
    let error = root.get("error")?;
    let message = match error {
        Value::String(message) => message.clone(),
        Value::Object(error) => error.get("message").and_then(Value::as_str)?.to_string(),
        _ => return None,
    };

    let code = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());

    Some(GatewayErrorEnvelope { code, message })
}

fn to_json<T: serde::Serialize>(call: &ProviderCall, value: &T) -> Result<Value, ProviderError> {
    serde_json::to_value(value).map_err(|error| ProviderError::Serialization {
        provider: call.provider,
        model: Some(call.target.primary().to_string()),
        message: error.to_string(),
    })
}

fn protocol_error(
    provider: ProviderKind,
    model: Option<&str>,
    message: impl Into<String>,
) -> ProviderError {
    ProviderError::Protocol {
        provider,
        model: model.map(str::to_string),
        request_id: None,
        message: message.into(),
    }
}
