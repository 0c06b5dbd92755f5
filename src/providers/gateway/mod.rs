use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::traits::{ProviderTransport, TransportId};
use crate::core::types::{CallContext, NormalizedResponse, ProviderCall};
use crate::providers::gateway_translate::{
    GatewayDecodeEnvelope, GatewayTranslator, format_gateway_error_message,
    parse_gateway_error_envelope,
};
use crate::providers::translator_contract::ProviderTranslator;
use crate::transport::http::{AUTH_BEARER_TOKEN_KEY, CUSTOM_HEADER_PREFIX, HttpTransport};

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://openrouter.ai/api";
pub const DEFAULT_GATEWAY_PATH: &str = "/v1/chat/completions";

const HEADER_HTTP_REFERER: &str = "http-referer";
const HEADER_X_TITLE: &str = "x-title";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    pub base_url: String,
    pub path: String,
    /// Used when the call context carries no caller credential.
    pub token: Option<String>,
    pub timeout_ms: Option<u64>,
    pub http_referer: Option<String>,
    pub x_title: Option<String>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            path: DEFAULT_GATEWAY_PATH.to_string(),
            token: None,
            timeout_ms: None,
            http_referer: None,
            x_title: None,
        }
    }
}

impl GatewayOptions {
    fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Self::invalid_config(format!(
                "base_url must start with http:// or https://, got {base_url:?}"
            )));
        }

        if !self.path.starts_with('/') {
            return Err(Self::invalid_config(format!(
                "path must start with '/', got {:?}",
                self.path
            )));
        }

        if let Some(http_referer) = &self.http_referer
            && http_referer.trim().is_empty()
        {
            return Err(Self::invalid_config(
                "http_referer must be non-empty when provided",
            ));
        }

        if let Some(x_title) = &self.x_title
            && x_title.trim().is_empty()
        {
            return Err(Self::invalid_config("x_title must be non-empty when provided"));
        }

        Ok(())
    }

    fn invalid_config(reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidGatewayConfig {
            reason: reason.into(),
        }
    }
}

/// Sends calls to an OpenAI-compatible AI gateway.
pub struct GatewayTransport {
    http: HttpTransport,
    translator: GatewayTranslator,
    endpoint: String,
    token: Option<String>,
    options: GatewayOptions,
}

impl GatewayTransport {
    pub fn new(options: GatewayOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let http = HttpTransport::new(options.timeout_ms)?;
        Ok(Self::with_http(options, http))
    }

    pub fn with_http(options: GatewayOptions, http: HttpTransport) -> Self {
        Self {
            http,
            translator: GatewayTranslator,
            endpoint: format!("{}{}", normalize_base_url(&options.base_url), options.path),
            token: sanitize_token(options.token.clone()),
            options,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Caller credential first, then the configured token.
    fn resolve_token(&self, ctx: &CallContext) -> Option<String> {
        sanitize_token(ctx.authorization.clone()).or_else(|| self.token.clone())
    }

    fn attach_transport_context(&self, ctx: &CallContext, token: String) -> CallContext {
        let mut request_ctx = ctx.clone();
        request_ctx
            .metadata
            .insert(AUTH_BEARER_TOKEN_KEY.to_string(), token);

        if let Some(http_referer) = &self.options.http_referer {
            request_ctx.metadata.insert(
                format!("{CUSTOM_HEADER_PREFIX}{HEADER_HTTP_REFERER}"),
                http_referer.clone(),
            );
        }

        if let Some(x_title) = &self.options.x_title {
            request_ctx.metadata.insert(
                format!("{CUSTOM_HEADER_PREFIX}{HEADER_X_TITLE}"),
                x_title.clone(),
            );
        }

        request_ctx
    }

    /// 401 and 403 are credential rejections; every other status stays an
    /// upstream status error.
    fn normalize_transport_error(error: ProviderError) -> ProviderError {
        match error {
            ProviderError::Status {
                provider,
                model,
                status_code,
                request_id,
                message,
            } => {
                let message = parse_gateway_error_envelope(&message)
                    .map(|envelope| format_gateway_error_message(&envelope))
                    .unwrap_or(message);

                if status_code == 401 || status_code == 403 {
                    return ProviderError::CredentialsRejected {
                        provider,
                        status_code,
                        request_id,
                        message,
                    };
                }

                ProviderError::Status {
                    provider,
                    model,
                    status_code,
                    request_id,
                    message,
                }
            }
            other => other,
        }
    }
}

#[async_trait]
impl ProviderTransport for GatewayTransport {
    fn id(&self) -> TransportId {
        TransportId::Gateway
    }

    async fn send(
        &self,
        call: &ProviderCall,
        ctx: &CallContext,
    ) -> Result<NormalizedResponse, ProviderError> {
        let model = call.target.primary();
        let token = self
            .resolve_token(ctx)
            .ok_or_else(|| ProviderError::MissingCredentials {
                provider: call.provider,
                model: Some(model.to_string()),
                message: "no caller authorization and no gateway token configured".to_string(),
            })?;

        let body = self.translator.encode_request(call)?;
        let request_ctx = self.attach_transport_context(ctx, token);

        let response_body: Value = self
            .http
            .post_json(call.provider, Some(model), &self.endpoint, &body, &request_ctx)
            .await
            .map_err(Self::normalize_transport_error)?;

        self.translator.decode_response(&GatewayDecodeEnvelope {
            body: response_body,
            provider: call.provider,
            shape: call.shape.clone(),
        })
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return DEFAULT_GATEWAY_BASE_URL.to_string();
    }

    trimmed.trim_end_matches('/').to_string()
}

fn sanitize_token(token: Option<String>) -> Option<String> {
    token.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
