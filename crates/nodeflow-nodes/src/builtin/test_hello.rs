use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::error::Result;
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::wrong_call;

/// Smoke-test provider that greets and echoes the run input.
#[derive(Clone)]
pub struct TestHelloNode {
    descriptor: Arc<NodeDescriptor>,
}

impl TestHelloNode {
    pub fn new() -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "testHello".into(),
                label: "Test Hello".into(),
                version: 1.0,
                category: "Utilities".into(),
                description: "Greets and echoes the input; useful for checking a deployment".into(),
                kind: NodeKind::Provider,
                base_classes: vec!["TestHello".into()],
                inputs: vec![
                    NodeParam::new("Greeting", "greeting", "string").with_default(json!("Hello")),
                    NodeParam::new("Name", "name", "string").with_default(json!("World")),
                ],
                outputs: vec![NodeOutput::new("Greeting", "testHello", &["TestHello"])],
            }),
        }
    }
}

impl Default for TestHelloNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for TestHelloNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let d = &self.descriptor;
            let greeting = d.str_value(params, "greeting").unwrap_or("Hello");
            let name = d.str_value(params, "name").unwrap_or("World");
            Ok(json!(format!("{} {}! You said: {}", greeting, name, ctx.input_text)))
        })
    }
}
