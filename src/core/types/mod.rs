use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Upstream integration a model is served through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Google,
    Deepseek,
    Perplexity,
    Openrouter,
    InProcess,
    Compatible,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Deepseek => "deepseek",
            Self::Perplexity => "perplexity",
            Self::Openrouter => "openrouter",
            Self::InProcess => "in-process",
            Self::Compatible => "compatible",
        }
    }

    /// Maps a provider slug to a known provider; unknown slugs are
    /// OpenAI-compatible endpoints reached through the gateway.
    pub fn from_slug(slug: &str) -> Self {
        match slug.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::Openai,
            "anthropic" => Self::Anthropic,
            "google" | "google-ai-studio" => Self::Google,
            "deepseek" => Self::Deepseek,
            "perplexity" => Self::Perplexity,
            "openrouter" => Self::Openrouter,
            "in-process" | "local" => Self::InProcess,
            _ => Self::Compatible,
        }
    }

    /// Infers the provider from a `provider/model` id.
    pub fn infer_from_model_id(model_id: &str) -> Option<Self> {
        model_id
            .split_once('/')
            .map(|(provider, _)| Self::from_slug(provider))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "reasoning")]
    Reasoning,
    #[serde(rename = "reasoning-low")]
    ReasoningLow,
    #[serde(rename = "reasoning-medium")]
    ReasoningMedium,
    #[serde(rename = "reasoning-high")]
    ReasoningHigh,
    #[serde(rename = "tools")]
    Tools,
    #[serde(rename = "structuredOutput")]
    StructuredOutput,
    #[serde(rename = "responseFormat")]
    ResponseFormat,
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "code")]
    Code,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::ReasoningLow => "reasoning-low",
            Self::ReasoningMedium => "reasoning-medium",
            Self::ReasoningHigh => "reasoning-high",
            Self::Tools => "tools",
            Self::StructuredOutput => "structuredOutput",
            Self::ResponseFormat => "responseFormat",
            Self::Online => "online",
            Self::Code => "code",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reasoning" => Ok(Self::Reasoning),
            "reasoning-low" => Ok(Self::ReasoningLow),
            "reasoning-medium" => Ok(Self::ReasoningMedium),
            "reasoning-high" => Ok(Self::ReasoningHigh),
            "tools" => Ok(Self::Tools),
            "structuredOutput" => Ok(Self::StructuredOutput),
            "responseFormat" => Ok(Self::ResponseFormat),
            "online" => Ok(Self::Online),
            "code" => Ok(Self::Code),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// Ordered so rendering and comparisons are deterministic.
pub type CapabilitySet = BTreeSet<Capability>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn capability(self) -> Capability {
        match self {
            Self::Low => Capability::ReasoningLow,
            Self::Medium => Capability::ReasoningMedium,
            Self::High => Capability::ReasoningHigh,
        }
    }
}

/// Order in which a composite model's children are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildPriority {
    #[default]
    First,
    Seeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDescriptor {
    pub slug: String,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: CapabilitySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default_priority")]
    pub child_priority: ChildPriority,
}

impl ModelDescriptor {
    pub fn new(
        slug: impl Into<String>,
        provider: ProviderKind,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            slug: slug.into(),
            provider,
            capabilities: capabilities.into_iter().collect(),
            display_name: None,
            aliases: Vec::new(),
            children: Vec::new(),
            child_priority: ChildPriority::First,
        }
    }

    /// Descriptor for a model id the catalog does not list. Nothing is known
    /// about its capabilities.
    pub fn unlisted(model_id: &str) -> Self {
        let provider =
            ProviderKind::infer_from_model_id(model_id).unwrap_or(ProviderKind::Openrouter);
        Self::new(model_id, provider, [])
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn supports(&self, required: &CapabilitySet) -> bool {
        required.is_subset(&self.capabilities)
    }

    pub fn missing(&self, required: &CapabilitySet) -> CapabilitySet {
        required.difference(&self.capabilities).copied().collect()
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_children<I, S>(mut self, children: I, priority: ChildPriority) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self.child_priority = priority;
        self
    }
}

fn is_default_priority(priority: &ChildPriority) -> bool {
    *priority == ChildPriority::First
}

/// What the resolver settled on. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ModelTarget {
    Single(String),
    Candidates(Vec<String>),
}

impl ModelTarget {
    pub fn primary(&self) -> &str {
        match self {
            Self::Single(model) => model,
            Self::Candidates(models) => models.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn slugs(&self) -> Vec<&str> {
        match self {
            Self::Single(model) => vec![model.as_str()],
            Self::Candidates(models) => models.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NoCapableCandidate,
    LookupFailed,
    NoModelRequested,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoCapableCandidate => "no_capable_candidate",
            Self::LookupFailed => "lookup_failed",
            Self::NoModelRequested => "no_model_requested",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModel {
    /// Descriptor of the primary target, used for dialect selection.
    pub descriptor: ModelDescriptor,
    pub target: ModelTarget,
    /// Candidates exactly as the caller supplied them.
    pub requested: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
}

impl ResolvedModel {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Fields this crate does not interpret; forwarded upstream untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            model: None,
            models: Vec::new(),
            messages,
            tools: Vec::new(),
            response_format: None,
            reasoning_effort: None,
            seed: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

impl ChatMessage {
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(MessageRole::User, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
    Null,
}

/// A tool entry as it appears in an inbound request: either a bare action
/// name resolved elsewhere, or a typed definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolEntry {
    Named(String),
    Definition(ToolDefinition),
}

impl ToolEntry {
    pub fn function(
        name: impl Into<String>,
        description: Option<String>,
        parameters: Value,
    ) -> Self {
        Self::Definition(ToolDefinition {
            kind: "function".to_string(),
            function: Some(FunctionDefinition {
                name: name.into(),
                description,
                parameters: Some(parameters),
            }),
            extra: Map::new(),
        })
    }

    pub fn typed(kind: impl Into<String>) -> Self {
        Self::Definition(ToolDefinition {
            kind: kind.into(),
            function: None,
            extra: Map::new(),
        })
    }

    /// Name used by the active-tool allow-list.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Definition(definition) => definition
                .function
                .as_ref()
                .map(|function| function.name.as_str())
                .unwrap_or(definition.kind.as_str()),
        }
    }

    pub fn is_web_search(&self) -> bool {
        matches!(self, Self::Definition(definition) if definition.kind.starts_with("web_search"))
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Self::Named(_) => true,
            Self::Definition(definition) => definition.kind == "function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDefinition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Requested output format. Types this crate does not model keep their raw
/// JSON in `Other` and are forwarded upstream unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema {
        json_schema: Option<JsonSchemaFormat>,
    },
    Other(Value),
}

impl ResponseFormat {
    pub fn schema(&self) -> Option<&Value> {
        match self {
            Self::JsonSchema { json_schema } => json_schema
                .as_ref()
                .and_then(|format| format.schema.as_ref()),
            _ => None,
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Self::JsonSchema {
                json_schema: Some(format),
            } if !format.name.trim().is_empty() => Some(format.name.as_str()),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownResponseFormat {
    Text,
    JsonObject,
    JsonSchema {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        json_schema: Option<JsonSchemaFormat>,
    },
}

const KNOWN_RESPONSE_FORMAT_TYPES: &[&str] = &["text", "json_object", "json_schema"];

impl Serialize for ResponseFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text => KnownResponseFormat::Text.serialize(serializer),
            Self::JsonObject => KnownResponseFormat::JsonObject.serialize(serializer),
            Self::JsonSchema { json_schema } => KnownResponseFormat::JsonSchema {
                json_schema: json_schema.clone(),
            }
            .serialize(serializer),
            Self::Other(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ResponseFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let known = raw
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| KNOWN_RESPONSE_FORMAT_TYPES.contains(&kind));
        if !known {
            return Ok(Self::Other(raw));
        }

        let format = serde_json::from_value(raw).map_err(serde::de::Error::custom)?;
        Ok(match format {
            KnownResponseFormat::Text => Self::Text,
            KnownResponseFormat::JsonObject => Self::JsonObject,
            KnownResponseFormat::JsonSchema { json_schema } => Self::JsonSchema { json_schema },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Required,
}

/// Generation controls that are not part of the OpenAI wire body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default)]
    pub object_mode: bool,
    #[serde(default)]
    pub tools_only: bool,
    /// Names of tools the provider may see. Empty exposes none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request: ChatCompletionRequest,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl RequestEnvelope {
    pub fn new(request: ChatCompletionRequest, options: GenerationOptions) -> Self {
        Self { request, options }
    }

    /// Envelope for an inbound chat completion. Every tool the caller listed
    /// is enabled, since listing it is the caller's opt-in.
    pub fn from_chat(request: ChatCompletionRequest) -> Self {
        let active_tools = request
            .tools
            .iter()
            .map(|tool| tool.name().to_string())
            .collect();

        Self {
            request,
            options: GenerationOptions {
                active_tools,
                ..GenerationOptions::default()
            },
        }
    }

    /// Schema from the generation options, else from a `json_schema`
    /// response format.
    pub fn schema(&self) -> Option<&Value> {
        self.options.schema.as_ref().or_else(|| {
            self.request
                .response_format
                .as_ref()
                .and_then(ResponseFormat::schema)
        })
    }

    pub fn wants_object(&self) -> bool {
        self.options.object_mode
            || matches!(
                self.request.response_format,
                Some(ResponseFormat::JsonObject | ResponseFormat::JsonSchema { .. })
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// Upstream counts are untrusted; the derived sum saturates.
    pub fn derived_total_tokens(&self) -> u64 {
        self.total_tokens.unwrap_or_else(|| {
            self.prompt_tokens
                .unwrap_or(0)
                .saturating_add(self.completion_tokens.unwrap_or(0))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Upstream call shape picked by the dialect adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallShape {
    /// Plain chat completion.
    Text,
    /// Native object output constrained by a schema.
    Object {
        name: String,
        schema: Value,
        strict: bool,
    },
    /// Plain text call carrying schema instructions; the reply text is parsed
    /// locally.
    SchemaInstructions { schema: Value },
    /// Object output with no schema.
    NoSchemaObject,
}

impl CallShape {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Object { .. } => "object",
            Self::SchemaInstructions { .. } => "schema_instructions",
            Self::NoSchemaObject => "no_schema_object",
        }
    }
}

/// Provider-ready call derived from a resolved request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCall {
    pub provider: ProviderKind,
    pub target: ModelTarget,
    pub shape: CallShape,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub passthrough: Map<String, Value>,
}

/// Result of an in-process generation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Generation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Uniform response shape for every transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResponse {
    pub status: u16,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// JSON payload as returned (or wrapped) by the transport.
    pub body: Value,
}

/// Per-call context handed to transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CallContext {
    /// Caller credential: a raw token or a full `Bearer` header value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl CallContext {
    pub fn with_authorization(authorization: impl Into<String>) -> Self {
        Self {
            authorization: Some(authorization.into()),
            metadata: BTreeMap::new(),
        }
    }
}
