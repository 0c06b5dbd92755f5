use crate::core::types::ProviderKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid fallback model: {reason}")]
    InvalidFallbackModel { reason: String },
    #[error("invalid gateway config: {reason}")]
    InvalidGatewayConfig { reason: String },
    #[error("invalid timeout: {timeout_ms} ms")]
    InvalidTimeout { timeout_ms: u64 },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("invalid model catalog {path}: {reason}")]
    InvalidCatalog { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("malformed model id: {model:?}")]
    MalformedModelId { model: String },
    #[error("composite model {model} references unknown child {child}")]
    UnknownChild { model: String, child: String },
    #[error("catalog decode error: {message}")]
    Decode { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no transport registered for provider {provider}")]
    TransportNotRegistered { provider: ProviderKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error(
        "provider credentials missing{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), None, None)
    )]
    MissingCredentials {
        provider: ProviderKind,
        model: Option<String>,
        message: String,
    },
    #[error(
        "provider credentials rejected{context}: {message}",
        context = format_context(Some(.provider), None, .request_id.as_deref(), Some(*.status_code))
    )]
    CredentialsRejected {
        provider: ProviderKind,
        status_code: u16,
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "provider transport error{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), None, None)
    )]
    Transport {
        provider: ProviderKind,
        model: Option<String>,
        message: String,
    },
    #[error(
        "provider status error{context}: {message}",
        context = format_context(
            Some(.provider),
            .model.as_deref(),
            .request_id.as_deref(),
            Some(*.status_code)
        )
    )]
    Status {
        provider: ProviderKind,
        model: Option<String>,
        status_code: u16,
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "provider protocol error{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), .request_id.as_deref(), None)
    )]
    Protocol {
        provider: ProviderKind,
        model: Option<String>,
        request_id: Option<String>,
        message: String,
    },
    #[error(
        "provider serialization error{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), None, None)
    )]
    Serialization {
        provider: ProviderKind,
        model: Option<String>,
        message: String,
    },
}

impl ProviderError {
    /// Credential problems are configuration faults; everything else is an
    /// upstream failure.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::MissingCredentials { .. } | Self::CredentialsRejected { .. } => {
                FailureClass::ProviderAuth
            }
            _ => FailureClass::Upstream,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::MissingCredentials { provider, .. }
            | Self::CredentialsRejected { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Status { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Serialization { provider, .. } => *provider,
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::CredentialsRejected { status_code, .. } | Self::Status { status_code, .. } => {
                Some(*status_code)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    ProviderAuth,
    Upstream,
}

impl FailureClass {
    pub fn code(self) -> &'static str {
        match self {
            Self::ProviderAuth => "provider_auth",
            Self::Upstream => "upstream_error",
        }
    }

    /// Status reported to the caller of the router.
    pub fn status_code(self) -> u16 {
        match self {
            Self::ProviderAuth => 503,
            Self::Upstream => 502,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema reply from {model} is not valid JSON: {message}")]
pub struct SchemaParseError {
    pub model: String,
    pub message: String,
    /// Reply text after fence stripping.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("{code} [status={status}]: {source}", code = .class.code(), status = .class.status_code())]
    Provider {
        class: FailureClass,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    SchemaParse(#[from] SchemaParseError),
}

impl RouterError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) | Self::Routing(_) => 500,
            Self::Provider { class, .. } => class.status_code(),
            Self::SchemaParse(_) => 502,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Routing(_) => "routing_error",
            Self::Provider { class, .. } => class.code(),
            Self::SchemaParse(_) => "schema_parse_error",
        }
    }
}

impl From<ProviderError> for RouterError {
    fn from(error: ProviderError) -> Self {
        Self::Provider {
            class: error.class(),
            source: error,
        }
    }
}

fn format_context(
    provider: Option<&ProviderKind>,
    model: Option<&str>,
    request_id: Option<&str>,
    status_code: Option<u16>,
) -> String {
    let mut context = Vec::new();

    if let Some(provider) = provider {
        context.push(format!("provider={provider}"));
    }
    if let Some(model) = model {
        context.push(format!("model={model}"));
    }
    if let Some(request_id) = request_id {
        context.push(format!("request_id={request_id}"));
    }
    if let Some(status_code) = status_code {
        context.push(format!("status_code={status_code}"));
    }

    if context.is_empty() {
        String::new()
    } else {
        format!(" [{}]", context.join(", "))
    }
}
