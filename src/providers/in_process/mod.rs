use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::error::ProviderError;
use crate::core::traits::{Generator, ProviderTransport, TransportId};
use crate::core::types::{CallContext, Generation, NormalizedResponse, ProviderCall};

/// Dispatches calls to a local generator and wraps the result as a JSON
/// response, matching the gateway path.
pub struct InProcessTransport {
    generator: Arc<dyn Generator>,
}

impl InProcessTransport {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ProviderTransport for InProcessTransport {
    fn id(&self) -> TransportId {
        TransportId::InProcess
    }

    async fn send(
        &self,
        call: &ProviderCall,
        _ctx: &CallContext,
    ) -> Result<NormalizedResponse, ProviderError> {
        let generation = self.generator.generate(call).await?;
        let body = wrap_generation(&generation);

        Ok(NormalizedResponse {
            status: 200,
            provider: call.provider,
            model: call.target.primary().to_string(),
            text: generation.text,
            object: generation.object,
            tool_calls: generation.tool_calls,
            usage: generation.usage,
            finish_reason: generation.finish_reason,
            body,
        })
    }
}

fn wrap_generation(generation: &Generation) -> Value {
    json!({
        "object": generation.object,
        "text": generation.text,
        "toolCalls": generation.tool_calls,
        "usage": generation.usage,
        "messages": generation.messages,
        "finishReason": generation.finish_reason,
    })
}
