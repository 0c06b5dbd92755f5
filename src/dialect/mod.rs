use serde_json::Value;
use tracing::debug;

use crate::core::error::SchemaParseError;
use crate::core::types::{
    CallShape, Capability, ChatMessage, ModelDescriptor, NormalizedResponse, ProviderCall,
    ProviderKind, RequestEnvelope, ResponseFormat, ToolChoice, ToolEntry,
};
use crate::resolver::ResolvedRequest;

/// Prefix of the user message appended when a model cannot take a schema
/// natively. The pretty-printed schema follows on the next line.
pub const SCHEMA_INSTRUCTION: &str = "Format the response to this schema and only return the object:";

const DEFAULT_SCHEMA_NAME: &str = "response";

/// How a resolved model takes structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectProfile {
    /// Native object output with strict schema enforcement.
    StrictObject,
    /// Native object output; the provider decides how strictly to follow the
    /// schema.
    NativeObject,
    /// No native support for this model version. Schemas travel as prompt
    /// text and replies are parsed locally.
    PromptedSchema,
}

impl DialectProfile {
    pub fn for_model(model: &ModelDescriptor) -> Self {
        let native = model.capabilities.contains(&Capability::StructuredOutput)
            || model.capabilities.contains(&Capability::Tools);

        if !native {
            return Self::PromptedSchema;
        }

        match model.provider {
            ProviderKind::Openai | ProviderKind::Google => Self::StrictObject,
            _ => Self::NativeObject,
        }
    }

    pub fn is_native(self) -> bool {
        !matches!(self, Self::PromptedSchema)
    }
}

/// Derives the provider call for a resolved request. `envelope` supplies the
/// generation options; messages and model fields come from `resolved`.
pub fn build_provider_call(envelope: &RequestEnvelope, resolved: &ResolvedRequest) -> ProviderCall {
    let request = &resolved.request;
    let descriptor = &resolved.resolved.descriptor;
    let profile = DialectProfile::for_model(descriptor);

    let mut messages = Vec::with_capacity(request.messages.len() + 2);
    if let Some(system) = envelope
        .options
        .system
        .as_deref()
        .filter(|system| !system.trim().is_empty())
    {
        messages.push(ChatMessage::system(system));
    }
    messages.extend(request.messages.iter().cloned());

    let mut tools = active_tools(&request.tools, &envelope.options.active_tools);

    let shape = match envelope.schema() {
        Some(schema) if profile.is_native() => CallShape::Object {
            name: schema_name(request.response_format.as_ref()),
            schema: schema.clone(),
            strict: profile == DialectProfile::StrictObject,
        },
        Some(schema) => {
            messages.push(schema_instruction_message(schema));
            tools.clear();
            CallShape::SchemaInstructions {
                schema: schema.clone(),
            }
        }
        None if envelope.wants_object() => CallShape::NoSchemaObject,
        None => CallShape::Text,
    };

    let mut passthrough = request.extra.clone();
    if let (CallShape::Text, Some(ResponseFormat::Other(raw))) =
        (&shape, &request.response_format)
    {
        passthrough.insert("response_format".to_string(), raw.clone());
    }

    let tool_choice = (!tools.is_empty()).then_some(if envelope.options.tools_only {
        ToolChoice::Required
    } else {
        ToolChoice::Auto
    });

    debug!(
        model = resolved.resolved.target.primary(),
        provider = %descriptor.provider,
        profile = ?profile,
        shape = shape.name(),
        tools = tools.len(),
        "built provider call"
    );

    ProviderCall {
        provider: descriptor.provider,
        target: resolved.resolved.target.clone(),
        shape,
        messages,
        tools,
        tool_choice,
        reasoning_effort: request.reasoning_effort.clone(),
        seed: request.seed,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        passthrough,
    }
}

/// Tools whose names appear in the allow-list, in request order.
fn active_tools(tools: &[ToolEntry], allowed: &[String]) -> Vec<ToolEntry> {
    tools
        .iter()
        .filter(|tool| allowed.iter().any(|name| name == tool.name()))
        .cloned()
        .collect()
}

fn schema_name(response_format: Option<&ResponseFormat>) -> String {
    response_format
        .and_then(ResponseFormat::schema_name)
        .unwrap_or(DEFAULT_SCHEMA_NAME)
        .to_string()
}

fn schema_instruction_message(schema: &Value) -> ChatMessage {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    ChatMessage::user(format!("{SCHEMA_INSTRUCTION}\n{rendered}"))
}

/// Removes a Markdown code fence (with or without a `json` tag) wrapped
/// around a reply.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.trim_start();
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim_end();
    }

    body
}

pub fn parse_schema_reply(model: &str, text: &str) -> Result<Value, SchemaParseError> {
    let stripped = strip_code_fences(text);
    serde_json::from_str(stripped).map_err(|error| SchemaParseError {
        model: model.to_string(),
        message: error.to_string(),
        text: stripped.to_string(),
    })
}

/// Fills `object` from the reply text when the call carried schema
/// instructions. Other shapes pass through unchanged.
pub fn complete_response(
    call: &ProviderCall,
    mut response: NormalizedResponse,
) -> Result<NormalizedResponse, SchemaParseError> {
    if !matches!(call.shape, CallShape::SchemaInstructions { .. }) || response.object.is_some() {
        return Ok(response);
    }

    let text = response.text.as_deref().unwrap_or_default();
    response.object = Some(parse_schema_reply(&response.model, text)?);
    Ok(response)
}

#[cfg(test)]
mod tests;
