use std::time::Duration;

use reqwest::Response;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::types::{CallContext, ProviderKind};

pub const AUTH_BEARER_TOKEN_KEY: &str = "transport.auth.bearer_token";
pub const CUSTOM_HEADER_PREFIX: &str = "transport.header.";
pub const REQUEST_ID_HEADER_KEY: &str = "transport.request_id_header";
const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";
const BEARER_PREFIX: &str = "Bearer ";

/// JSON-over-HTTP client for upstream calls. One attempt per call; no retry.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// `timeout_ms` of `None` leaves the client default in place.
    pub fn new(timeout_ms: Option<u64>) -> Result<Self, ConfigError> {
        Self::with_client(reqwest::Client::new(), timeout_ms)
    }

    pub fn with_client(
        client: reqwest::Client,
        timeout_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if let Some(timeout_ms) = timeout_ms {
            Self::validate_timeout(timeout_ms)?;
        }

        Ok(Self {
            client,
            timeout: timeout_ms.map(Duration::from_millis),
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// POSTs `body` as JSON. Non-2xx responses become `ProviderError::Status`
    /// carrying the response body as the message.
    pub async fn post_json<TReq, TResp>(
        &self,
        provider: ProviderKind,
        model: Option<&str>,
        url: &str,
        body: &TReq,
        ctx: &CallContext,
    ) -> Result<TResp, ProviderError>
    where
        TReq: Serialize + ?Sized,
        TResp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|error| ProviderError::Serialization {
            provider,
            model: model.map(str::to_string),
            message: error.to_string(),
        })?;

        let header_config = build_header_config(provider, model, ctx)?;

        let mut request_builder = self
            .client
            .post(url)
            .headers(header_config.headers)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload);
        if let Some(timeout) = self.timeout {
            request_builder = request_builder.timeout(timeout);
        }

        debug!(%provider, model, url, "sending upstream request");

        let response = request_builder
            .send()
            .await
            .map_err(|error| ProviderError::Transport {
                provider,
                model: model.map(str::to_string),
                message: error.to_string(),
            })?;

        let status_code = response.status().as_u16();
        let request_id = extract_request_id(response.headers(), &header_config.request_id_header);

        if !response.status().is_success() {
            return Err(build_status_error(provider, model, status_code, request_id, response).await);
        }

        response.json::<TResp>().await.map_err(|error| ProviderError::Protocol {
            provider,
            model: model.map(str::to_string),
            request_id,
            message: format!("response body is not valid JSON: {error}"),
        })
    }

    fn validate_timeout(timeout_ms: u64) -> Result<(), ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout { timeout_ms });
        }
        Ok(())
    }
}

/// Prefixes a raw token with `Bearer `; full header values pass through.
pub fn normalize_bearer(token: &str) -> String {
    let token = token.trim();
    if token.starts_with(BEARER_PREFIX) {
        token.to_string()
    } else {
        format!("{BEARER_PREFIX}{token}")
    }
}

async fn build_status_error(
    provider: ProviderKind,
    model: Option<&str>,
    status_code: u16,
    request_id: Option<String>,
    response: Response,
) -> ProviderError {
    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => body,
        Ok(_) => format!("http status {status_code}"),
        Err(error) => format!("http status {status_code}; failed to read response body: {error}"),
    };

    ProviderError::Status {
        provider,
        model: model.map(str::to_string),
        status_code,
        request_id,
        message,
    }
}

struct HeaderConfig {
    headers: HeaderMap,
    request_id_header: HeaderName,
}

fn build_header_config(
    provider: ProviderKind,
    model: Option<&str>,
    ctx: &CallContext,
) -> Result<HeaderConfig, ProviderError> {
    let request_id_header = match ctx.metadata.get(REQUEST_ID_HEADER_KEY) {
        Some(value) => parse_header_name(value, provider, model)?,
        None => HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
    };

    let mut headers = HeaderMap::new();
    if let Some(token) = ctx
        .metadata
        .get(AUTH_BEARER_TOKEN_KEY)
        .filter(|token| !token.trim().is_empty())
    {
        let auth_value = HeaderValue::from_str(&normalize_bearer(token)).map_err(|error| {
            ProviderError::Protocol {
                provider,
                model: model.map(str::to_string),
                request_id: None,
                message: format!("invalid bearer token header value: {error}"),
            }
        })?;
        headers.insert(AUTHORIZATION, auth_value);
    }

    for (key, value) in &ctx.metadata {
        if let Some(raw_name) = key.strip_prefix(CUSTOM_HEADER_PREFIX) {
            let header_name = parse_header_name(raw_name, provider, model)?;
            let header_value =
                HeaderValue::from_str(value).map_err(|error| ProviderError::Protocol {
                    provider,
                    model: model.map(str::to_string),
                    request_id: None,
                    message: format!("invalid header value for {raw_name}: {error}"),
                })?;
            headers.insert(header_name, header_value);
        }
    }

    Ok(HeaderConfig {
        headers,
        request_id_header,
    })
}

fn parse_header_name(
    value: &str,
    provider: ProviderKind,
    model: Option<&str>,
) -> Result<HeaderName, ProviderError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|error| ProviderError::Protocol {
        provider,
        model: model.map(str::to_string),
        request_id: None,
        message: format!("invalid header name: {value}: {error}"),
    })
}

fn extract_request_id(headers: &HeaderMap, request_id_header: &HeaderName) -> Option<String> {
    headers
        .get(request_id_header)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
