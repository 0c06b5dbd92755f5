use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::*;
use crate::catalog::ModelCatalog;
use crate::core::error::{FailureClass, ProviderError, RoutingError};
use crate::core::traits::{Generator, TransportId};
use crate::core::types::{
    CallShape, Capability, ChatMessage, ChildPriority, Generation, JsonSchemaFormat,
    ModelDescriptor, ModelTarget, ProviderKind, ResponseFormat, ToolEntry, Usage,
};
use crate::providers::in_process::InProcessTransport;

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    Fail(ProviderError),
}

struct MockTransport {
    reply: Reply,
    calls: Mutex<Vec<(ProviderCall, CallContext)>>,
}

impl MockTransport {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(ProviderCall, CallContext)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ProviderTransport for MockTransport {
    fn id(&self) -> TransportId {
        TransportId::Gateway
    }

    async fn send(
        &self,
        call: &ProviderCall,
        ctx: &CallContext,
    ) -> Result<NormalizedResponse, ProviderError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((call.clone(), ctx.clone()));

        match &self.reply {
            Reply::Text(text) => Ok(NormalizedResponse {
                status: 200,
                provider: call.provider,
                model: call.target.primary().to_string(),
                text: Some(text.to_string()),
                object: None,
                tool_calls: Vec::new(),
                usage: Usage::default(),
                finish_reason: Some("stop".to_string()),
                body: json!({}),
            }),
            Reply::Fail(error) => Err(error.clone()),
        }
    }
}

struct ConstantGenerator;

#[async_trait]
impl Generator for ConstantGenerator {
    async fn generate(&self, _call: &ProviderCall) -> Result<Generation, ProviderError> {
        Ok(Generation {
            object: Some(json!({"ok": true})),
            ..Generation::default()
        })
    }
}

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
            [Capability::Tools],
        ),
        ModelDescriptor::new("legacy/some-legacy-model", ProviderKind::Compatible, []),
        ModelDescriptor::new(
            "local/echo",
            ProviderKind::InProcess,
            [Capability::StructuredOutput, Capability::ResponseFormat],
        ),
        ModelDescriptor::new("drivly/frontier", ProviderKind::Openrouter, []).with_children(
            ["anthropic/claude-3", "openai/gpt-4o"],
            ChildPriority::First,
        ),
    ])
    .expect("test catalog should build")
}

fn router(transport: Arc<MockTransport>, fallback: &str) -> ModelRouter {
    ModelRouter::builder()
        .with_catalog(Arc::new(catalog()))
        .with_fallback_model(fallback)
        .with_transport(transport)
        .build()
        .expect("router should build")
}

fn envelope(value: Value) -> RequestEnvelope {
    RequestEnvelope::from_chat(serde_json::from_value(value).expect("request decodes"))
}

#[test]
fn test_route_filters_candidates_by_tools() {
    let router = router(MockTransport::new(Reply::Text("")), "openai/gpt-4o");
    let envelope = envelope(json!({
        "models": ["legacy/some-legacy-model", "anthropic/claude-3"],
        "messages": [{"role": "user", "content": "hi"}],
        "tools": [{"type": "function", "function": {"name": "search", "parameters": {}}}]
    }));

    let decision = router.route(&envelope);

    assert_eq!(
        decision.resolved.target,
        ModelTarget::Candidates(vec!["anthropic/claude-3".to_string()])
    );
    assert_eq!(decision.call.target, decision.resolved.target);
    assert_eq!(decision.call.tools.len(), 1);
    assert_eq!(decision.request.model, None);
    assert_eq!(envelope.request.models.len(), 2);
}

#[test]
fn test_build_rejects_composite_or_empty_fallback() {
    let composite = ModelRouter::builder()
        .with_catalog(Arc::new(catalog()))
        .with_fallback_model("drivly/frontier")
        .build();
    assert!(matches!(
        composite,
        Err(ConfigError::InvalidFallbackModel { .. })
    ));

    let empty = ModelRouter::builder().with_fallback_model("  ").build();
    assert!(matches!(empty, Err(ConfigError::InvalidFallbackModel { .. })));
}

#[tokio::test]
async fn test_send_parses_schema_reply_for_legacy_model() {
    let transport = MockTransport::new(Reply::Text("```json\n{\"answer\":\"4\"}\n```"));
    let router = router(Arc::clone(&transport), "legacy/some-legacy-model");
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("2 + 2?")]);
    request.model = Some("legacy/some-legacy-model".to_string());
    request.response_format = Some(ResponseFormat::JsonSchema {
        json_schema: Some(JsonSchemaFormat {
            name: "answer".to_string(),
            description: None,
            schema: Some(json!({"type": "object"})),
            strict: None,
        }),
    });

    let routed = router
        .send(&RequestEnvelope::from_chat(request), &CallContext::default())
        .await
        .expect("send succeeds");

    assert!(matches!(
        routed.decision.call.shape,
        CallShape::SchemaInstructions { .. }
    ));
    assert_eq!(routed.response.object, Some(json!({"answer": "4"})));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_unparseable_schema_reply_is_a_typed_error() {
    let transport = MockTransport::new(Reply::Text("sure! here you go"));
    let router = router(transport, "legacy/some-legacy-model");
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("2 + 2?")]);
    request.model = Some("legacy/some-legacy-model".to_string());
    let envelope = RequestEnvelope::new(
        request,
        crate::core::types::GenerationOptions {
            schema: Some(json!({"type": "object"})),
            ..Default::default()
        },
    );

    let error = router
        .send(&envelope, &CallContext::default())
        .await
        .expect_err("reply is not JSON");

    assert!(matches!(error, RouterError::SchemaParse(_)));
    assert_eq!(error.status_code(), 502);
    assert_eq!(error.code(), "schema_parse_error");
}

#[tokio::test]
async fn test_provider_failures_are_classified() {
    let rejected = ProviderError::CredentialsRejected {
        provider: ProviderKind::Openai,
        status_code: 401,
        request_id: None,
        message: "bad key".to_string(),
    };
    let upstream = ProviderError::Status {
        provider: ProviderKind::Openai,
        model: Some("openai/gpt-4o".to_string()),
        status_code: 500,
        request_id: None,
        message: "boom".to_string(),
    };

    let mut outcomes = Vec::new();
    for failure in [rejected, upstream] {
        let router = router(MockTransport::new(Reply::Fail(failure)), "openai/gpt-4o");
        let error = router
            .send(
                &envelope(json!({
                    "model": "openai/gpt-4o",
                    "messages": [{"role": "user", "content": "hi"}]
                })),
                &CallContext::default(),
            )
            .await
            .expect_err("provider fails");
        outcomes.push(error);
    }

    match &outcomes[0] {
        RouterError::Provider { class, source } => {
            assert_eq!(*class, FailureClass::ProviderAuth);
            assert_eq!(source.upstream_status(), Some(401));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
    assert_eq!(outcomes[0].status_code(), 503);
    assert_eq!(outcomes[1].status_code(), 502);
    assert_eq!(outcomes[1].code(), "upstream_error");
    assert_ne!(outcomes[0].code(), outcomes[1].code());
}

#[tokio::test]
async fn test_missing_transport_is_a_routing_error() {
    let router = router(MockTransport::new(Reply::Text("")), "openai/gpt-4o");

    let error = router
        .send(
            &envelope(json!({
                "model": "local/echo",
                "messages": [{"role": "user", "content": "hi"}]
            })),
            &CallContext::default(),
        )
        .await
        .expect_err("no in-process transport registered");

    assert_eq!(
        error,
        RouterError::Routing(RoutingError::TransportNotRegistered {
            provider: ProviderKind::InProcess,
        })
    );
}

#[tokio::test]
async fn test_in_process_models_use_the_generator() {
    let router = ModelRouter::builder()
        .with_catalog(Arc::new(catalog()))
        .with_transport(Arc::new(InProcessTransport::new(Arc::new(ConstantGenerator))))
        .build()
        .expect("router should build");

    let routed = router
        .send(
            &envelope(json!({
                "model": "local/echo",
                "messages": [{"role": "user", "content": "hi"}],
                "response_format": {"type": "json_object"}
            })),
            &CallContext::default(),
        )
        .await
        .expect("generator succeeds");

    assert_eq!(routed.response.object, Some(json!({"ok": true})));
    assert_eq!(routed.decision.call.shape, CallShape::NoSchemaObject);
}

#[tokio::test]
async fn test_call_context_merges_router_defaults() {
    let transport = MockTransport::new(Reply::Text("hello"));
    let mut defaults = CallContext::with_authorization("default-token");
    defaults
        .metadata
        .insert("tenant".to_string(), "acme".to_string());
    let router = ModelRouter::builder()
        .with_catalog(Arc::new(catalog()))
        .with_transport(Arc::clone(&transport) as Arc<dyn ProviderTransport>)
        .with_call_context(defaults)
        .build()
        .expect("router should build");
    let envelope = envelope(json!({
        "model": "openai/gpt-4o",
        "messages": [{"role": "user", "content": "hi"}]
    }));

    router
        .send(&envelope, &CallContext::default())
        .await
        .expect("send succeeds");
    router
        .send(&envelope, &CallContext::with_authorization("Bearer caller"))
        .await
        .expect("send succeeds");

    let calls = transport.calls();
    assert_eq!(calls[0].1.authorization.as_deref(), Some("default-token"));
    assert_eq!(calls[0].1.metadata.get("tenant").map(String::as_str), Some("acme"));
    assert_eq!(calls[1].1.authorization.as_deref(), Some("Bearer caller"));
}

#[test]
fn test_named_tools_need_tool_capable_models() {
    let router = router(MockTransport::new(Reply::Text("")), "openai/gpt-4o");
    let mut request = ChatCompletionRequest::new(vec![ChatMessage::user("star it")]);
    request.model = Some("legacy/some-legacy-model".to_string());
    request.tools = vec![ToolEntry::Named("GITHUB_STAR_REPO".to_string())];

    let decision = router.route(&RequestEnvelope::from_chat(request));

    assert_eq!(
        decision.resolved.target,
        ModelTarget::Single("openai/gpt-4o".to_string())
    );
    assert!(decision.resolved.is_fallback());
    assert_eq!(decision.call.tools.len(), 1);
}
