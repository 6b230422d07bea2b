use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::info;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{LlmClient, Node};
use nodeflow_core::types::*;

use super::chat_openai::ChatModelSpec;
use super::wrong_call;

const BASE_CLASSES: &[&str] = &["LLMChain", "BaseChain"];

/// Runs a formatted prompt through a language model.
#[derive(Clone)]
pub struct LlmChainNode {
    descriptor: Arc<NodeDescriptor>,
    llm: Arc<dyn LlmClient>,
}

impl LlmChainNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "llmChain".into(),
                label: "LLM Chain".into(),
                version: 1.0,
                category: "Chains".into(),
                description: "Chain to run queries against LLMs".into(),
                kind: NodeKind::Processor,
                base_classes: BASE_CLASSES.iter().map(|s| s.to_string()).collect(),
                inputs: vec![
                    NodeParam::new("Language Model", "model", "BaseLanguageModel").connection(),
                    NodeParam::new("Prompt", "prompt", "BasePromptTemplate").connection(),
                    NodeParam::new("Documents", "documents", "Document")
                        .connection()
                        .optional(),
                    NodeParam::new("Chain Name", "chainName", "string").optional(),
                ],
                outputs: vec![NodeOutput::new("LLM Chain", "llmChain", BASE_CLASSES)],
            }),
            llm,
        }
    }
}

fn model_spec(node_id: &str, value: &serde_json::Value) -> Result<ChatModelSpec> {
    let config = value.get("config").unwrap_or(value);
    serde_json::from_value(config.clone())
        .map_err(|e| NodeflowError::node(node_id, format!("invalid language model input: {}", e)))
}

fn prompt_text(value: &serde_json::Value) -> String {
    match value.get("formatted").and_then(|f| f.as_str()) {
        Some(formatted) => formatted.to_string(),
        None => text_content(value),
    }
}

impl Node for LlmChainNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Processor { params, connected } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Processor, &call));
            };

            let lookup = |name: &str| {
                connected
                    .get(name)
                    .or_else(|| params.get(name))
                    .filter(|v| !v.is_null())
            };
            let missing = |name: &str| NodeflowError::MissingRequiredInput {
                node: ctx.node_id.clone(),
                input: name.to_string(),
            };

            let spec = model_spec(&ctx.node_id, lookup("model").ok_or_else(|| missing("model"))?)?;
            let prompt = prompt_text(lookup("prompt").ok_or_else(|| missing("prompt"))?);
            let chain_name = self
                .descriptor
                .str_value(params, "chainName")
                .unwrap_or("default_chain")
                .to_string();

            let mut messages = Vec::new();
            if let Some(documents) = lookup("documents") {
                messages.push(ChatMessage::system(format!(
                    "Use the following context to answer.\n\n{}",
                    text_content(documents)
                )));
            }
            messages.push(ChatMessage::user(prompt.clone()));

            info!(
                node_id = %ctx.node_id,
                chain = %chain_name,
                model = %spec.model_name,
                "Running LLM chain"
            );

            let response = self
                .llm
                .complete(CompletionRequest {
                    provider: spec.provider.clone(),
                    model_id: spec.model_name.clone(),
                    api_key: spec.api_key.clone(),
                    base_url: spec.base_url.clone(),
                    temperature: spec.temperature,
                    max_tokens: spec.max_tokens,
                    messages,
                })
                .await?;

            Ok(json!({
                "type": "LLMChain",
                "chainName": chain_name,
                "response": response,
                "model_used": spec.model_name,
                "prompt_used": prompt,
                "baseClasses": BASE_CLASSES,
            }))
        })
    }
}
