use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::error::Result;
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::wrong_call;

const BASE_CLASSES: &[&str] = &["StringOutputParser", "BaseOutputParser"];

/// Reduces the single upstream result to plain text.
#[derive(Clone)]
pub struct StringOutputParserNode {
    descriptor: Arc<NodeDescriptor>,
}

impl StringOutputParserNode {
    pub fn new() -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "stringOutputParser".into(),
                label: "String Output Parser".into(),
                version: 1.0,
                category: "Output Parsers".into(),
                description: "Extract the text of a chain result".into(),
                kind: NodeKind::Terminator,
                base_classes: BASE_CLASSES.iter().map(|s| s.to_string()).collect(),
                inputs: vec![
                    NodeParam::new("Chain", "chain", "BaseChain").connection(),
                    NodeParam::new("Trim Whitespace", "trim", "boolean")
                        .optional()
                        .with_default(json!(true)),
                ],
                outputs: vec![NodeOutput::new("Text", "text", BASE_CLASSES)],
            }),
        }
    }
}

impl Default for StringOutputParserNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for StringOutputParserNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Terminator { params, upstream } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Terminator, &call));
            };
            let trim = self
                .descriptor
                .value(params, "trim")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);

            let text = text_content(upstream);
            let text = if trim { text.trim().to_string() } else { text };
            Ok(serde_json::Value::String(text))
        })
    }
}
