use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::error::CatalogError;
use crate::core::traits::{ModelLookup, ModelQuery};
use crate::core::types::{Capability, ChildPriority, ModelDescriptor, ProviderKind};

/// Read-only registry of known models, kept in priority order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Builds a catalog. The first entry for a slug wins; every composite
    /// child must resolve to a listed model.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, CatalogError> {
        let mut indexed = IndexMap::with_capacity(models.len());
        for model in models {
            if model.slug.trim().is_empty() {
                return Err(CatalogError::MalformedModelId { model: model.slug });
            }
            indexed.entry(model.slug.clone()).or_insert(model);
        }

        let catalog = Self { models: indexed };
        for model in catalog.models.values() {
            for child in &model.children {
                if catalog.find(child).is_none() {
                    return Err(CatalogError::UnknownChild {
                        model: model.slug.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument =
            serde_json::from_str(json).map_err(|error| CatalogError::Decode {
                message: error.to_string(),
            })?;
        Self::new(document.models)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Finds a model by slug, alias, or bare id (`gpt-4o` for `openai/gpt-4o`).
    pub fn lookup(&self, id: &str) -> Result<Option<&ModelDescriptor>, CatalogError> {
        validate_model_id(id)?;
        Ok(self.find(id.trim()))
    }

    fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        if let Some(model) = self.models.get(id) {
            return Some(model);
        }

        if let Some(model) = self
            .models
            .values()
            .find(|model| model.aliases.iter().any(|alias| alias == id))
        {
            return Some(model);
        }

        if id.contains('/') {
            return None;
        }

        self.models.values().find(|model| {
            model
                .slug
                .split_once('/')
                .is_some_and(|(_, bare)| bare == id)
        })
    }

    fn select_child(
        &self,
        composite: &ModelDescriptor,
        query: &ModelQuery,
    ) -> Option<&ModelDescriptor> {
        let capable: Vec<&ModelDescriptor> = composite
            .children
            .iter()
            .filter_map(|child| self.find(child))
            .filter(|child| !child.is_composite() && child.supports(&query.required))
            .collect();

        if capable.is_empty() {
            return None;
        }

        let index = match (composite.child_priority, query.seed) {
            (ChildPriority::Seeded, Some(seed)) => {
                seed.rem_euclid(capable.len() as i64) as usize
            }
            _ => 0,
        };

        capable.get(index).copied()
    }

    fn find_alternative(
        &self,
        requested: &ModelDescriptor,
        query: &ModelQuery,
    ) -> Option<&ModelDescriptor> {
        self.models.values().find(|candidate| {
            candidate.slug != requested.slug
                && !candidate.is_composite()
                && candidate.provider == requested.provider
                && candidate.supports(&query.required)
        })
    }
}

impl ModelLookup for ModelCatalog {
    fn get_model(
        &self,
        id: &str,
        query: &ModelQuery,
    ) -> Result<Option<ModelDescriptor>, CatalogError> {
        let Some(model) = self.lookup(id)? else {
            return Ok(None);
        };

        if model.is_composite() {
            return Ok(self.select_child(model, query).cloned());
        }

        if model.supports(&query.required) {
            return Ok(Some(model.clone()));
        }

        Ok(self.find_alternative(model, query).cloned())
    }

    fn get_models(&self, ids: &str) -> Result<Vec<ModelDescriptor>, CatalogError> {
        let mut models = Vec::new();
        for id in ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(model) = self.lookup(id)? {
                models.push(model.clone());
            }
        }
        Ok(models)
    }
}

pub fn export_catalog_json(catalog: &ModelCatalog) -> Result<String, CatalogError> {
    let mut models: Vec<ModelDescriptor> = catalog.iter().cloned().collect();
    models.sort_by(|left, right| {
        left.provider
            .cmp(&right.provider)
            .then_with(|| left.slug.cmp(&right.slug))
    });

    serde_json::to_string_pretty(&CatalogDocument { models }).map_err(|error| {
        CatalogError::Decode {
            message: error.to_string(),
        }
    })
}

fn validate_model_id(id: &str) -> Result<(), CatalogError> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed.contains(char::is_whitespace)
        || trimmed.contains(',')
        || trimmed.starts_with('/')
        || trimmed.ends_with('/')
    {
        return Err(CatalogError::MalformedModelId {
            model: id.to_string(),
        });
    }
    Ok(())
}

pub fn builtin_static_catalog() -> ModelCatalog {
    // Entries are unique and every child is listed.
    ModelCatalog::new(builtin_models()).unwrap_or_default()
}

fn builtin_models() -> Vec<ModelDescriptor> {
    use Capability::*;

    let reasoning = [Reasoning, ReasoningLow, ReasoningMedium, ReasoningHigh];

    vec![
        ModelDescriptor::new(
            "openai/gpt-4o",
            ProviderKind::Openai,
            [Tools, StructuredOutput, ResponseFormat],
        )
        .with_display_name("GPT-4o")
        .with_aliases(["chatgpt-4o-latest"]),
        ModelDescriptor::new(
            "openai/gpt-4o-mini",
            ProviderKind::Openai,
            [Tools, StructuredOutput, ResponseFormat],
        )
        .with_display_name("GPT-4o Mini"),
        ModelDescriptor::new(
            "openai/gpt-4o-2024-05-13",
            ProviderKind::Openai,
            [Tools, ResponseFormat],
        ),
        ModelDescriptor::new(
            "openai/gpt-4o-search-preview",
            ProviderKind::Openai,
            [Online, ResponseFormat],
        ),
        ModelDescriptor::new(
            "openai/o1",
            ProviderKind::Openai,
            reasoning
                .into_iter()
                .chain([Tools, StructuredOutput, ResponseFormat]),
        )
        .with_display_name("o1"),
        ModelDescriptor::new(
            "openai/o3-mini",
            ProviderKind::Openai,
            reasoning
                .into_iter()
                .chain([Tools, StructuredOutput, ResponseFormat, Code]),
        )
        .with_display_name("o3 Mini"),
        ModelDescriptor::new("openai/o1-mini-2024-09-12", ProviderKind::Openai, [Reasoning]),
        ModelDescriptor::new(
            "openai/o1-preview-2024-09-12",
            ProviderKind::Openai,
            [Reasoning],
        ),
        ModelDescriptor::new(
            "anthropic/claude-3.7-sonnet",
            ProviderKind::Anthropic,
            [Tools, Code],
        )
        .with_display_name("Claude 3.7 Sonnet")
        .with_aliases(["claude-3-7-sonnet-latest", "claude-3-7-sonnet-20250219"]),
        ModelDescriptor::new(
            "anthropic/claude-3.7-sonnet:thinking",
            ProviderKind::Anthropic,
            reasoning.into_iter().chain([Tools, Code]),
        )
        .with_display_name("Claude 3.7 Sonnet (thinking)"),
        ModelDescriptor::new(
            "anthropic/claude-3.5-haiku",
            ProviderKind::Anthropic,
            [Tools],
        )
        .with_aliases(["claude-3-5-haiku-latest", "claude-3-5-haiku-20241022"]),
        ModelDescriptor::new(
            "google/gemini-2.0-flash-001",
            ProviderKind::Google,
            [Tools, StructuredOutput, ResponseFormat, Online],
        )
        .with_display_name("Gemini 2.0 Flash"),
        ModelDescriptor::new(
            "google/gemini-2.0-flash-thinking-exp",
            ProviderKind::Google,
            [Reasoning],
        ),
        ModelDescriptor::new(
            "deepseek/deepseek-chat",
            ProviderKind::Deepseek,
            [Tools, ResponseFormat],
        ),
        ModelDescriptor::new(
            "deepseek/deepseek-r1",
            ProviderKind::Deepseek,
            [Reasoning],
        )
        .with_aliases(["deepseek-reasoner"]),
        ModelDescriptor::new("perplexity/sonar", ProviderKind::Perplexity, [Online]),
        ModelDescriptor::new(
            "drivly/frontier",
            ProviderKind::Openrouter,
            [Reasoning, Code, Online],
        )
        .with_display_name("Frontier")
        .with_children(
            [
                "google/gemini-2.0-flash-001",
                "anthropic/claude-3.7-sonnet:thinking",
                "openai/o1",
            ],
            ChildPriority::First,
        ),
    ]
}
