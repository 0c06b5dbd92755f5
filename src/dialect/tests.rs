use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::catalog::ModelCatalog;
use crate::core::types::{
    ChatCompletionRequest, GenerationOptions, JsonSchemaFormat, MessageContent, MessageRole,
    ModelTarget, Usage,
};
use crate::resolver::ModelResolver;

fn catalog() -> ModelCatalog {
    ModelCatalog::new(vec![
        ModelDescriptor::new(
            "openai/gpt-4o",
            ProviderKind::Openai,
            [Capability::Tools, Capability::StructuredOutput],
        ),
        ModelDescriptor::new(
            "anthropic/claude-3",
            ProviderKind::Anthropic,
            [Capability::Tools, Capability::StructuredOutput],
        ),
        ModelDescriptor::new("legacy/some-legacy-model", ProviderKind::Compatible, []),
    ])
    .expect("test catalog should build")
}

fn resolve(envelope: &RequestEnvelope, fallback: &str) -> ResolvedRequest {
    ModelResolver::new(Arc::new(catalog()), fallback).resolve_request(&envelope.request)
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "answer": { "type": "string" } },
        "required": ["answer"]
    })
}

fn json_schema_request(model: &str) -> ChatCompletionRequest {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("What is 2 + 2?")]);
    request.model = Some(model.to_string());
    request.response_format = Some(ResponseFormat::JsonSchema {
        json_schema: Some(JsonSchemaFormat {
            name: "math".to_string(),
            description: None,
            schema: Some(schema()),
            strict: None,
        }),
    });
    request
}

fn has_schema_instruction(call: &ProviderCall) -> bool {
    call.messages.iter().any(|message| {
        matches!(&message.content, MessageContent::Text(text) if text.starts_with(SCHEMA_INSTRUCTION))
    })
}

fn response(model: &str, text: &str) -> NormalizedResponse {
    NormalizedResponse {
        status: 200,
        provider: ProviderKind::Compatible,
        model: model.to_string(),
        text: Some(text.to_string()),
        object: None,
        tool_calls: Vec::new(),
        usage: Usage::default(),
        finish_reason: Some("stop".to_string()),
        body: json!({}),
    }
}

#[test]
fn test_profile_follows_model_capabilities() {
    let gpt = ModelDescriptor::new(
        "openai/gpt-4o",
        ProviderKind::Openai,
        [Capability::StructuredOutput],
    );
    let claude = ModelDescriptor::new("anthropic/claude", ProviderKind::Anthropic, [Capability::Tools]);
    let o1_mini = ModelDescriptor::new(
        "openai/o1-mini-2024-09-12",
        ProviderKind::Openai,
        [Capability::Reasoning],
    );

    assert_eq!(DialectProfile::for_model(&gpt), DialectProfile::StrictObject);
    assert_eq!(DialectProfile::for_model(&claude), DialectProfile::NativeObject);
    assert_eq!(DialectProfile::for_model(&o1_mini), DialectProfile::PromptedSchema);
}

#[test]
fn test_no_schema_passes_messages_through() {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")]);
    request.model = Some("openai/gpt-4o".to_string());
    request.extra.insert("user".to_string(), json!("caller-1"));
    let envelope = RequestEnvelope::from_chat(request.clone());

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert_eq!(call.shape, CallShape::Text);
    assert_eq!(call.messages, request.messages);
    assert_eq!(call.tool_choice, None);
    assert_eq!(call.passthrough.get("user"), Some(&json!("caller-1")));
}

#[test]
fn test_native_model_gets_object_call_without_instructions() {
    let envelope = RequestEnvelope::from_chat(json_schema_request("openai/gpt-4o"));

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert_eq!(
        call.shape,
        CallShape::Object {
            name: "math".to_string(),
            schema: schema(),
            strict: true,
        }
    );
    assert!(!has_schema_instruction(&call));
    assert_eq!(call.messages.len(), 1);
}

#[test]
fn test_non_strict_provider_keeps_native_object_call() {
    let envelope = RequestEnvelope::from_chat(json_schema_request("anthropic/claude-3"));

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert!(matches!(call.shape, CallShape::Object { strict: false, .. }));
    assert!(!has_schema_instruction(&call));
}

#[test]
fn test_legacy_model_gets_schema_instructions_and_parses_fenced_reply() {
    // The legacy model is also the fallback, so resolution settles on it.
    let envelope = RequestEnvelope::from_chat(json_schema_request("legacy/some-legacy-model"));
    let resolved = resolve(&envelope, "legacy/some-legacy-model");

    let call = build_provider_call(&envelope, &resolved);

    assert_eq!(call.target, ModelTarget::Single("legacy/some-legacy-model".to_string()));
    assert_eq!(call.shape, CallShape::SchemaInstructions { schema: schema() });
    assert!(has_schema_instruction(&call));
    let last = call.messages.last().expect("instruction message");
    assert_eq!(last.role, MessageRole::User);
    let MessageContent::Text(text) = &last.content else {
        panic!("instruction should be text");
    };
    assert!(text.contains("\"answer\""));

    let reply = response("legacy/some-legacy-model", "```json\n{\"answer\": \"4\"}\n```");
    let completed = complete_response(&call, reply).expect("fenced reply should parse");
    assert_eq!(completed.object, Some(json!({"answer": "4"})));
}

#[test]
fn test_schema_from_options_applies_without_response_format() {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")]);
    request.model = Some("legacy/some-legacy-model".to_string());
    let envelope = RequestEnvelope::new(
        request,
        GenerationOptions {
            schema: Some(schema()),
            ..GenerationOptions::default()
        },
    );

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert!(matches!(call.shape, CallShape::SchemaInstructions { .. }));
}

#[test]
fn test_object_mode_without_schema_uses_no_schema_object() {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")]);
    request.model = Some("openai/gpt-4o".to_string());
    request.response_format = Some(ResponseFormat::JsonObject);
    let envelope = RequestEnvelope::from_chat(request);

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert_eq!(call.shape, CallShape::NoSchemaObject);
}

#[test]
fn test_tools_follow_allow_list_and_tool_choice() {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")]);
    request.model = Some("openai/gpt-4o".to_string());
    request.tools = vec![
        ToolEntry::function("search", None, json!({"type": "object"})),
        ToolEntry::function("delete_everything", None, json!({"type": "object"})),
    ];

    let unlisted = RequestEnvelope::new(request.clone(), GenerationOptions::default());
    let call = build_provider_call(&unlisted, &resolve(&unlisted, "openai/gpt-4o"));
    assert!(call.tools.is_empty());
    assert_eq!(call.tool_choice, None);

    let allowed = RequestEnvelope::new(
        request.clone(),
        GenerationOptions {
            active_tools: vec!["search".to_string()],
            ..GenerationOptions::default()
        },
    );
    let call = build_provider_call(&allowed, &resolve(&allowed, "openai/gpt-4o"));
    assert_eq!(call.tools.len(), 1);
    assert_eq!(call.tools[0].name(), "search");
    assert_eq!(call.tool_choice, Some(ToolChoice::Auto));

    let tools_only = RequestEnvelope::new(
        request,
        GenerationOptions {
            active_tools: vec!["search".to_string()],
            tools_only: true,
            ..GenerationOptions::default()
        },
    );
    let call = build_provider_call(&tools_only, &resolve(&tools_only, "openai/gpt-4o"));
    assert_eq!(call.tool_choice, Some(ToolChoice::Required));
}

#[test]
fn test_system_option_is_prepended() {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("hi")]);
    request.model = Some("openai/gpt-4o".to_string());
    let envelope = RequestEnvelope::new(
        request,
        GenerationOptions {
            system: Some("You are terse.".to_string()),
            ..GenerationOptions::default()
        },
    );

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert_eq!(call.messages.len(), 2);
    assert_eq!(call.messages[0], ChatMessage::system("You are terse."));
}

#[test]
fn test_strip_code_fences() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```\n[1,2]\n```\n"), "[1,2]");
    assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
}

#[test]
fn test_malformed_schema_reply_is_a_typed_error() {
    let error = parse_schema_reply("legacy/some-legacy-model", "```json\n{answer: 4\n```")
        .expect_err("reply is not JSON");

    assert_eq!(error.model, "legacy/some-legacy-model");
    assert_eq!(error.text, "{answer: 4");
}

#[test]
fn test_complete_response_leaves_native_shapes_alone() {
    let envelope = RequestEnvelope::from_chat(json_schema_request("openai/gpt-4o"));
    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    let reply = response("openai/gpt-4o", "not json");
    let completed = complete_response(&call, reply.clone()).expect("native shape is untouched");

    assert_eq!(completed, reply);
}

#[test]
fn test_unmodelled_response_format_rides_along_on_text_calls() {
    let raw = json!({"type": "grammar", "grammar": "root ::= digit"});
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("pick a digit")]);
    request.model = Some("openai/gpt-4o".to_string());
    request.response_format = Some(ResponseFormat::Other(raw.clone()));
    let envelope = RequestEnvelope::from_chat(request);

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert_eq!(call.shape, CallShape::Text);
    assert_eq!(call.passthrough.get("response_format"), Some(&raw));
}

#[test]
fn test_bare_json_schema_format_without_schema_is_object_mode() {
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("2 + 2?")]);
    request.model = Some("openai/gpt-4o".to_string());
    request.response_format = Some(ResponseFormat::JsonSchema { json_schema: None });
    let envelope = RequestEnvelope::from_chat(request);

    let call = build_provider_call(&envelope, &resolve(&envelope, "openai/gpt-4o"));

    assert_eq!(call.shape, CallShape::NoSchemaObject);
    assert!(call.passthrough.get("response_format").is_none());
}
