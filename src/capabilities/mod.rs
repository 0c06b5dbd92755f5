use crate::core::types::{
    Capability, CapabilitySet, ChatCompletionRequest, ReasoningEffort, ResponseFormat,
};

/// Derives the capabilities a model must have to serve `request`.
///
/// Pure: the same request always yields the same set, and a request with no
/// tools, reasoning effort, or response format yields the empty set.
pub fn required_capabilities(request: &ChatCompletionRequest) -> CapabilitySet {
    let mut required = CapabilitySet::new();

    if request.tools.iter().any(|tool| tool.is_web_search()) {
        required.insert(Capability::Online);
    }

    if let Some(effort) = request
        .reasoning_effort
        .as_deref()
        .and_then(ReasoningEffort::parse)
    {
        required.insert(Capability::Reasoning);
        required.insert(effort.capability());
    }

    if request.tools.iter().any(|tool| tool.is_callable()) {
        required.insert(Capability::Tools);
    }

    match request.response_format {
        Some(ResponseFormat::JsonSchema { .. }) => {
            required.insert(Capability::StructuredOutput);
        }
        Some(ResponseFormat::JsonObject) => {
            required.insert(Capability::ResponseFormat);
        }
        Some(ResponseFormat::Text | ResponseFormat::Other(_)) | None => {}
    }

    required
}

pub fn render_capabilities(capabilities: &CapabilitySet) -> String {
    capabilities
        .iter()
        .map(|capability| capability.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
