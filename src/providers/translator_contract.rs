use crate::core::error::ProviderError;
use crate::core::types::{NormalizedResponse, ProviderCall};

/// Wire codec between a provider call and one upstream protocol.
///
/// `ProviderTransport` is the public extension point; translators stay
/// crate-private and only convert payloads.
pub(crate) trait ProviderTranslator {
    /// Outbound protocol payload.
    type RequestPayload;

    /// Inbound protocol payload.
    type ResponsePayload;

    fn encode_request(&self, call: &ProviderCall) -> Result<Self::RequestPayload, ProviderError>;

    fn decode_response(
        &self,
        payload: &Self::ResponsePayload,
    ) -> Result<NormalizedResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::ProviderTranslator;
    use crate::core::error::ProviderError;
    use crate::core::types::{
        CallShape, ChatMessage, ModelTarget, NormalizedResponse, ProviderCall, ProviderKind,
        Usage,
    };

    struct EchoTranslator;

    impl ProviderTranslator for EchoTranslator {
        type RequestPayload = Value;
        type ResponsePayload = Value;

        fn encode_request(
            &self,
            call: &ProviderCall,
        ) -> Result<Self::RequestPayload, ProviderError> {
            Ok(json!({
                "model": call.target.primary(),
                "message_count": call.messages.len(),
            }))
        }

        fn decode_response(
            &self,
            payload: &Self::ResponsePayload,
        ) -> Result<NormalizedResponse, ProviderError> {
            Ok(NormalizedResponse {
                status: 200,
                provider: ProviderKind::Compatible,
                model: "echo".to_string(),
                text: payload.get("text").and_then(Value::as_str).map(str::to_string),
                object: None,
                tool_calls: Vec::new(),
                usage: Usage::default(),
                finish_reason: None,
                body: payload.clone(),
            })
        }
    }

    fn sample_call() -> ProviderCall {
        ProviderCall {
            provider: ProviderKind::Compatible,
            target: ModelTarget::Candidates(vec!["a/one".to_string(), "b/two".to_string()]),
            shape: CallShape::Text,
            messages: vec![ChatMessage::user("hello")],
            tools: Vec::new(),
            tool_choice: None,
            reasoning_effort: None,
            seed: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            passthrough: Map::new(),
        }
    }

    #[test]
    fn test_translator_encodes_primary_target_and_decodes_text() {
        let translator = EchoTranslator;

        let encoded = translator
            .encode_request(&sample_call())
            .expect("encode should succeed");
        assert_eq!(encoded.get("model"), Some(&json!("a/one")));
        assert_eq!(encoded.get("message_count"), Some(&json!(1)));

        let decoded = translator
            .decode_response(&json!({ "text": "done" }))
            .expect("decode should succeed");
        assert_eq!(decoded.text.as_deref(), Some("done"));
        assert_eq!(decoded.status, 200);
    }
}
