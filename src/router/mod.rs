use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::capabilities::render_capabilities;
use crate::catalog::builtin_static_catalog;
use crate::config::{DEFAULT_FALLBACK_MODEL, RouterConfig};
use crate::core::error::{ConfigError, RouterError};
use crate::core::traits::{ModelLookup, ProviderTransport};
use crate::core::types::{
    CallContext, CapabilitySet, ChatCompletionRequest, NormalizedResponse, ProviderCall,
    RequestEnvelope, ResolvedModel,
};
use crate::dialect::{build_provider_call, complete_response};
use crate::providers::gateway::GatewayTransport;
use crate::registry::TransportRegistry;
use crate::resolver::ModelResolver;

/// Everything decided for one request before any upstream call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub required: CapabilitySet,
    pub resolved: ResolvedModel,
    /// Inbound request with `model`/`models` rewritten.
    pub request: ChatCompletionRequest,
    pub call: ProviderCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedResponse {
    pub decision: RoutingDecision,
    pub response: NormalizedResponse,
}

pub struct ModelRouter {
    resolver: ModelResolver,
    registry: TransportRegistry,
    call_context: CallContext,
}

pub struct ModelRouterBuilder {
    catalog: Arc<dyn ModelLookup>,
    fallback_model: String,
    transports: Vec<Arc<dyn ProviderTransport>>,
    call_context: CallContext,
}

impl ModelRouter {
    pub fn builder() -> ModelRouterBuilder {
        ModelRouterBuilder {
            catalog: Arc::new(builtin_static_catalog()),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            transports: Vec::new(),
            call_context: CallContext::default(),
        }
    }

    /// Router with the configured catalog and a gateway transport.
    pub fn from_config(config: &RouterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = config.load_catalog()?;
        let gateway = GatewayTransport::new(config.gateway.clone())?;

        Self::builder()
            .with_catalog(Arc::new(catalog))
            .with_fallback_model(config.fallback_model.clone())
            .with_transport(Arc::new(gateway))
            .build()
    }

    pub fn fallback_model(&self) -> &str {
        self.resolver.fallback_model()
    }

    /// Resolves the model and shapes the provider call. Never fails: model
    /// selection problems degrade to the fallback model.
    pub fn route(&self, envelope: &RequestEnvelope) -> RoutingDecision {
        let resolved = self.resolver.resolve_request(&envelope.request);
        let call = build_provider_call(envelope, &resolved);

        debug!(
            required = %render_capabilities(&resolved.required),
            target = ?resolved.resolved.target,
            fallback = resolved.resolved.is_fallback(),
            shape = call.shape.name(),
            "routed request"
        );

        RoutingDecision {
            required: resolved.required,
            resolved: resolved.resolved,
            request: resolved.request,
            call,
        }
    }

    /// Routes `envelope` and issues exactly one upstream call.
    pub async fn send(
        &self,
        envelope: &RequestEnvelope,
        ctx: &CallContext,
    ) -> Result<RoutedResponse, RouterError> {
        let decision = self.route(envelope);
        let transport = self.registry.resolve_transport(decision.call.provider)?;
        let ctx = self.merge_context(ctx);

        let response = match transport.send(&decision.call, &ctx).await {
            Ok(response) => response,
            Err(source) => {
                let error = RouterError::from(source);
                error!(
                    code = error.code(),
                    status = error.status_code(),
                    model = decision.call.target.primary(),
                    provider = %decision.call.provider,
                    %error,
                    "provider call failed"
                );
                return Err(error);
            }
        };

        let response = complete_response(&decision.call, response).map_err(|source| {
            error!(model = %source.model, %source, "schema reply could not be parsed");
            RouterError::from(source)
        })?;

        info!(
            model = %response.model,
            provider = %response.provider,
            shape = decision.call.shape.name(),
            total_tokens = response.usage.derived_total_tokens(),
            "provider call completed"
        );

        Ok(RoutedResponse { decision, response })
    }

    /// Per-call values override the router defaults.
    fn merge_context(&self, ctx: &CallContext) -> CallContext {
        let mut merged = self.call_context.clone();
        if ctx.authorization.is_some() {
            merged.authorization = ctx.authorization.clone();
        }
        merged
            .metadata
            .extend(ctx.metadata.iter().map(|(key, value)| (key.clone(), value.clone())));
        merged
    }
}

impl ModelRouterBuilder {
    pub fn with_catalog(mut self, catalog: Arc<dyn ModelLookup>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_fallback_model(mut self, fallback_model: impl Into<String>) -> Self {
        self.fallback_model = fallback_model.into();
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ProviderTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn with_call_context(mut self, call_context: CallContext) -> Self {
        self.call_context = call_context;
        self
    }

    /// Fails when the fallback model is empty or names a composite model,
    /// since neither can be sent upstream.
    pub fn build(self) -> Result<ModelRouter, ConfigError> {
        let fallback_model = self.fallback_model.trim().to_string();
        if fallback_model.is_empty() {
            return Err(ConfigError::InvalidFallbackModel {
                reason: "fallback model must be non-empty".to_string(),
            });
        }

        if let Ok(models) = self.catalog.get_models(&fallback_model)
            && models.first().is_some_and(|model| model.is_composite())
        {
            return Err(ConfigError::InvalidFallbackModel {
                reason: format!("{fallback_model} is a composite model"),
            });
        }

        let mut registry = TransportRegistry::new();
        for transport in self.transports {
            registry.register(transport);
        }

        Ok(ModelRouter {
            resolver: ModelResolver::new(self.catalog, fallback_model),
            registry,
            call_context: self.call_context,
        })
    }
}

#[cfg(test)]
mod tests;
