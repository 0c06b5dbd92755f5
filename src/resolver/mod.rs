use std::sync::Arc;

use tracing::{debug, warn};

use crate::capabilities::{render_capabilities, required_capabilities};
use crate::core::error::CatalogError;
use crate::core::traits::{ModelLookup, ModelQuery};
use crate::core::types::{
    CapabilitySet, ChatCompletionRequest, FallbackReason, ModelDescriptor, ModelTarget,
    ResolvedModel,
};

/// Model selection exactly as the caller expressed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedModels {
    None,
    Single(String),
    List(Vec<String>),
}

impl RequestedModels {
    /// Reads `model`/`models` from a request. A `model` given next to
    /// `models` joins the end of the list.
    pub fn from_request(request: &ChatCompletionRequest) -> Self {
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty());

        if request.models.is_empty() {
            return match model {
                Some(model) => Self::Single(model.to_string()),
                None => Self::None,
            };
        }

        let mut models = request.models.clone();
        if let Some(model) = model {
            models.push(model.to_string());
        }
        Self::List(models)
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Single(model) => vec![model.clone()],
            Self::List(models) => models.clone(),
        }
    }
}

/// Request with its model fields rewritten to the resolution outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub request: ChatCompletionRequest,
    pub required: CapabilitySet,
    pub resolved: ResolvedModel,
}

/// Selects the upstream model for a request. Never fails: misses and lookup
/// errors fall back to the configured model.
#[derive(Clone)]
pub struct ModelResolver {
    lookup: Arc<dyn ModelLookup>,
    fallback_model: String,
}

impl ModelResolver {
    pub fn new(lookup: Arc<dyn ModelLookup>, fallback_model: impl Into<String>) -> Self {
        Self {
            lookup,
            fallback_model: fallback_model.into(),
        }
    }

    pub fn fallback_model(&self) -> &str {
        &self.fallback_model
    }

    /// Extracts required capabilities, resolves, and returns a rewritten copy
    /// of `request`. The input is left untouched.
    pub fn resolve_request(&self, request: &ChatCompletionRequest) -> ResolvedRequest {
        let required = required_capabilities(request);
        let requested = RequestedModels::from_request(request);
        let resolved = self.resolve(&requested, &required, request.seed);

        let mut rewritten = request.clone();
        match &resolved.target {
            ModelTarget::Single(model) => {
                rewritten.model = Some(model.clone());
                rewritten.models = Vec::new();
            }
            ModelTarget::Candidates(models) => {
                rewritten.model = None;
                rewritten.models = models.clone();
            }
        }

        ResolvedRequest {
            request: rewritten,
            required,
            resolved,
        }
    }

    pub fn resolve(
        &self,
        requested: &RequestedModels,
        required: &CapabilitySet,
        seed: Option<i64>,
    ) -> ResolvedModel {
        let query = ModelQuery {
            required: required.clone(),
            seed,
        };

        match requested {
            RequestedModels::None => {
                self.fallback(Vec::new(), required, FallbackReason::NoModelRequested)
            }
            RequestedModels::Single(model) => self.resolve_single(model, &query),
            RequestedModels::List(models) => self.resolve_list(models, &query),
        }
    }

    fn resolve_single(&self, model: &str, query: &ModelQuery) -> ResolvedModel {
        let requested = vec![model.to_string()];

        match self.lookup.get_model(model, query) {
            Ok(Some(descriptor)) => {
                if descriptor.slug != model {
                    debug!(
                        requested = model,
                        selected = %descriptor.slug,
                        required = %render_capabilities(&query.required),
                        "substituted capable model"
                    );
                }
                ResolvedModel {
                    target: ModelTarget::Single(descriptor.slug.clone()),
                    descriptor,
                    requested,
                    fallback: None,
                }
            }
            Ok(None) => {
                self.fallback(requested, &query.required, FallbackReason::NoCapableCandidate)
            }
            Err(error) => {
                warn!(model, %error, "model lookup failed");
                self.fallback(requested, &query.required, FallbackReason::LookupFailed)
            }
        }
    }

    fn resolve_list(&self, models: &[String], query: &ModelQuery) -> ResolvedModel {
        let mut selected: Vec<ModelDescriptor> = Vec::new();
        let mut lookup_failed = false;

        for model in models {
            match self.capable_entry(model, query) {
                Ok(Some(descriptor)) => {
                    if !selected.iter().any(|existing| existing.slug == descriptor.slug) {
                        selected.push(descriptor);
                    }
                }
                Ok(None) => {
                    debug!(
                        model = model.as_str(),
                        required = %render_capabilities(&query.required),
                        "dropped incapable candidate"
                    );
                }
                Err(error) => {
                    warn!(model = model.as_str(), %error, "model lookup failed");
                    lookup_failed = true;
                }
            }
        }

        if selected.is_empty() {
            let reason = if lookup_failed {
                FallbackReason::LookupFailed
            } else {
                FallbackReason::NoCapableCandidate
            };
            return self.fallback(models.to_vec(), &query.required, reason);
        }

        let slugs = selected.iter().map(|model| model.slug.clone()).collect();
        ResolvedModel {
            descriptor: selected.swap_remove(0),
            target: ModelTarget::Candidates(slugs),
            requested: models.to_vec(),
            fallback: None,
        }
    }

    /// Candidates are kept or dropped, never swapped for an alternative;
    /// composites expand to their capable child.
    fn capable_entry(
        &self,
        model: &str,
        query: &ModelQuery,
    ) -> Result<Option<ModelDescriptor>, CatalogError> {
        let Some(descriptor) = self.lookup.get_models(model)?.into_iter().next() else {
            return Ok(None);
        };

        if descriptor.is_composite() {
            return self.lookup.get_model(model, query);
        }

        Ok(descriptor.supports(&query.required).then_some(descriptor))
    }

    fn fallback(
        &self,
        requested: Vec<String>,
        required: &CapabilitySet,
        reason: FallbackReason,
    ) -> ResolvedModel {
        warn!(
            %reason,
            requested = ?requested,
            required = %render_capabilities(required),
            fallback = %self.fallback_model,
            "no capable model; using fallback"
        );

        let descriptor = match self.lookup.get_models(&self.fallback_model) {
            Ok(models) => models.into_iter().next(),
            Err(error) => {
                warn!(model = %self.fallback_model, %error, "fallback model lookup failed");
                None
            }
        }
        .unwrap_or_else(|| ModelDescriptor::unlisted(&self.fallback_model));

        ResolvedModel {
            descriptor,
            target: ModelTarget::Single(self.fallback_model.clone()),
            requested,
            fallback: Some(reason),
        }
    }
}
