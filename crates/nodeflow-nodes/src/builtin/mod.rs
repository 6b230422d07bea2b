pub mod chat_gemini;
pub mod chat_openai;
pub mod github_loader;
pub mod llm_chain;
pub mod output_parser;
pub mod prompt_template;
pub mod sitemap_loader;
pub mod test_hello;
pub mod web_loader;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::types::{NodeCall, NodeContext, NodeKind};

/// Error for a node invoked with a call shape that does not match its kind.
pub(crate) fn wrong_call(ctx: &NodeContext, expected: NodeKind, call: &NodeCall) -> NodeflowError {
    NodeflowError::node(
        &ctx.node_id,
        format!("expected a {} call, got {}", expected, call.kind()),
    )
}

/// Parse a JSON-ish input that may arrive as an object or as a JSON string.
pub(crate) fn json_object(
    ctx: &NodeContext,
    name: &str,
    value: Option<&serde_json::Value>,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(serde_json::Map::new()),
        Some(serde_json::Value::Object(map)) => Ok(map.clone()),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(serde_json::Map::new()),
        Some(serde_json::Value::String(s)) => match serde_json::from_str(s) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(NodeflowError::node(
                &ctx.node_id,
                format!("input '{}' must be a JSON object", name),
            )),
            Err(e) => Err(NodeflowError::node(
                &ctx.node_id,
                format!("input '{}' is not valid JSON: {}", name, e),
            )),
        },
        Some(_) => Err(NodeflowError::node(
            &ctx.node_id,
            format!("input '{}' must be a JSON object", name),
        )),
    }
}

#[cfg(test)]
pub(crate) fn context(node_id: &str, input: &str) -> NodeContext {
    NodeContext {
        node_id: node_id.to_string(),
        input_text: input.to_string(),
        correlation_id: nodeflow_core::types::SessionId::from_str("test_session"),
    }
}
