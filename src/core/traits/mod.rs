use async_trait::async_trait;

use crate::core::error::{CatalogError, ProviderError};
use crate::core::types::{
    CallContext, CapabilitySet, Generation, ModelDescriptor, NormalizedResponse, ProviderCall,
};

/// Query passed to a catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelQuery {
    pub required: CapabilitySet,
    /// Selects among equally capable children of a seeded composite model.
    pub seed: Option<i64>,
}

/// Catalog source consulted by the resolver.
///
/// Implementations must be safe for unsynchronized concurrent reads; the
/// resolver never mutates the catalog.
pub trait ModelLookup: Send + Sync {
    /// Returns the best model for `id` that satisfies `query.required`: the
    /// model itself, a capable child of a composite, or a capable alternative
    /// from the same provider. `Ok(None)` when nothing qualifies.
    fn get_model(
        &self,
        id: &str,
        query: &ModelQuery,
    ) -> Result<Option<ModelDescriptor>, CatalogError>;

    /// Returns the listed descriptors for a comma-separated id list, skipping
    /// unknown ids.
    fn get_models(&self, ids: &str) -> Result<Vec<ModelDescriptor>, CatalogError>;
}

/// Sends a provider-ready call upstream and returns the normalized response.
///
/// Transports do not retry, rate-limit, or cache.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Transport identity used by the registry.
    fn id(&self) -> TransportId;

    async fn send(
        &self,
        call: &ProviderCall,
        ctx: &CallContext,
    ) -> Result<NormalizedResponse, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportId {
    Gateway,
    InProcess,
}

/// Local generation function behind the in-process transport.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, call: &ProviderCall) -> Result<Generation, ProviderError>;
}
