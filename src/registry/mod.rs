use std::sync::Arc;

use crate::core::error::RoutingError;
use crate::core::traits::{ProviderTransport, TransportId};
use crate::core::types::ProviderKind;

/// Transports keyed by identity. Registering a transport with an id already
/// present replaces the earlier one.
#[derive(Default)]
pub struct TransportRegistry {
    transports: Vec<(TransportId, Arc<dyn ProviderTransport>)>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, transport: Arc<dyn ProviderTransport>) {
        let id = transport.id();

        if let Some((_, existing)) = self
            .transports
            .iter_mut()
            .find(|(registered, _)| *registered == id)
        {
            *existing = transport;
            return;
        }

        self.transports.push((id, transport));
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    pub fn resolve_transport(
        &self,
        provider: ProviderKind,
    ) -> Result<Arc<dyn ProviderTransport>, RoutingError> {
        let id = transport_for(provider);
        self.transports
            .iter()
            .find(|(registered, _)| *registered == id)
            .map(|(_, transport)| Arc::clone(transport))
            .ok_or(RoutingError::TransportNotRegistered { provider })
    }
}

/// Every hosted provider is reached through the gateway.
pub fn transport_for(provider: ProviderKind) -> TransportId {
    match provider {
        ProviderKind::InProcess => TransportId::InProcess,
        _ => TransportId::Gateway,
    }
}
