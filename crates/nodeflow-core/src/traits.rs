use futures::future::BoxFuture;

use crate::error::{NodeflowError, Result};
use crate::types::*;

/// One executable step of a flow graph.
pub trait Node: Send + Sync + 'static {
    /// Declared identity, kind, inputs and outputs.
    fn descriptor(&self) -> &NodeDescriptor;

    /// Check that every input the node cannot run without is present.
    ///
    /// `inputs` is the merged map of static values and connected results.
    fn validate_inputs(&self, node_id: &str, inputs: &ValueMap) -> Result<()> {
        for param in &self.descriptor().inputs {
            if !param.must_be_supplied() {
                continue;
            }
            let present = inputs.get(&param.name).is_some_and(|v| !v.is_null());
            if !present {
                return Err(NodeflowError::MissingRequiredInput {
                    node: node_id.to_string(),
                    input: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run the node.
    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Single-shot chat completion client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and return the assistant's text.
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>>;
}
