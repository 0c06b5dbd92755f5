use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::{ModelCatalog, builtin_static_catalog};
use crate::core::error::ConfigError;
use crate::providers::gateway::{DEFAULT_GATEWAY_BASE_URL, DEFAULT_GATEWAY_PATH, GatewayOptions};

pub const DEFAULT_FALLBACK_MODEL: &str = "openai/gpt-4o";

pub const ENV_FALLBACK_MODEL: &str = "MODEL_ROUTER_FALLBACK_MODEL";
pub const ENV_CATALOG: &str = "MODEL_ROUTER_CATALOG";
pub const ENV_GATEWAY_URL: &str = "AI_GATEWAY_URL";
pub const ENV_GATEWAY_PATH: &str = "AI_GATEWAY_PATH";
pub const ENV_GATEWAY_TOKEN: &str = "AI_GATEWAY_TOKEN";
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_GATEWAY_TIMEOUT_MS: &str = "AI_GATEWAY_TIMEOUT_MS";
pub const ENV_GATEWAY_HTTP_REFERER: &str = "AI_GATEWAY_HTTP_REFERER";
pub const ENV_GATEWAY_X_TITLE: &str = "AI_GATEWAY_X_TITLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub fallback_model: String,
    pub gateway: GatewayOptions,
    /// Catalog JSON replacing the built-in catalog.
    pub catalog_path: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            gateway: GatewayOptions::default(),
            catalog_path: None,
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout_ms = read(ENV_GATEWAY_TIMEOUT_MS)
            .map(|raw| {
                raw.parse::<u64>().map_err(|error| ConfigError::InvalidValue {
                    key: ENV_GATEWAY_TIMEOUT_MS.to_string(),
                    reason: format!("{raw:?} is not a whole number of milliseconds: {error}"),
                })
            })
            .transpose()?;

        let config = Self {
            fallback_model: read(ENV_FALLBACK_MODEL)
                .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
            gateway: GatewayOptions {
                base_url: read(ENV_GATEWAY_URL)
                    .unwrap_or_else(|| DEFAULT_GATEWAY_BASE_URL.to_string()),
                path: read(ENV_GATEWAY_PATH).unwrap_or_else(|| DEFAULT_GATEWAY_PATH.to_string()),
                token: read(ENV_GATEWAY_TOKEN).or_else(|| read(ENV_OPENROUTER_API_KEY)),
                timeout_ms,
                http_referer: read(ENV_GATEWAY_HTTP_REFERER),
                x_title: read(ENV_GATEWAY_X_TITLE),
            },
            catalog_path: read(ENV_CATALOG).map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fallback = self.fallback_model.trim();
        if fallback.is_empty() {
            return Err(ConfigError::InvalidFallbackModel {
                reason: "fallback model must be non-empty".to_string(),
            });
        }
        if fallback.contains(char::is_whitespace) || fallback.contains(',') {
            return Err(ConfigError::InvalidFallbackModel {
                reason: format!("fallback model must be a single model id, got {fallback:?}"),
            });
        }

        if let Some(timeout_ms) = self.gateway.timeout_ms
            && timeout_ms == 0
        {
            return Err(ConfigError::InvalidTimeout { timeout_ms });
        }

        Ok(())
    }

    /// Catalog from `catalog_path`, else the built-in one.
    pub fn load_catalog(&self) -> Result<ModelCatalog, ConfigError> {
        match &self.catalog_path {
            Some(path) => load_catalog_file(path),
            None => Ok(builtin_static_catalog()),
        }
    }
}

pub fn load_catalog_file(path: &Path) -> Result<ModelCatalog, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCatalog {
        path: path.display().to_string(),
        reason,
    };

    let contents = fs::read_to_string(path).map_err(|error| invalid(error.to_string()))?;
    let catalog = ModelCatalog::from_json(&contents).map_err(|error| invalid(error.to_string()))?;

    debug!(path = %path.display(), models = catalog.len(), "loaded model catalog");
    Ok(catalog)
}
