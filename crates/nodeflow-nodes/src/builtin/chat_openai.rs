use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::Result;
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::wrong_call;

const BASE_CLASSES: &[&str] = &["ChatOpenAI", "BaseChatModel", "BaseLanguageModel"];

/// Model settings carried in a chat model node's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatModelSpec {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_name: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_provider() -> String { "openai".to_string() }

/// Declared defaults for a chat model's tunable inputs.
pub(crate) fn model_inputs(
    model_id: &str,
    models: &[&str],
    temperature: f32,
    max_tokens: Option<u32>,
    base_url: Option<&str>,
) -> Vec<NodeParam> {
    let mut max_tokens_param = NodeParam::new("Max Tokens", "maxTokens", "number").optional();
    if let Some(n) = max_tokens {
        max_tokens_param = max_tokens_param.with_default(json!(n));
    }
    let mut base_url_param = NodeParam::new("Base URL", "baseUrl", "string").optional();
    if let Some(url) = base_url {
        base_url_param = base_url_param.with_default(json!(url));
    }

    vec![
        NodeParam::new("Model Name", "modelName", "options")
            .with_options(models)
            .with_default(json!(model_id)),
        NodeParam::new("Temperature", "temperature", "number")
            .optional()
            .with_default(json!(temperature)),
        max_tokens_param,
        base_url_param,
    ]
}

/// Read the model settings out of resolved params; descriptor defaults fill gaps.
pub(crate) fn model_spec(
    descriptor: &NodeDescriptor,
    params: &ValueMap,
    provider: &str,
    api_key: Option<String>,
) -> ChatModelSpec {
    ChatModelSpec {
        provider: provider.to_string(),
        model_name: descriptor
            .str_value(params, "modelName")
            .unwrap_or_default()
            .to_string(),
        temperature: descriptor.f64_value(params, "temperature").unwrap_or(0.7) as f32,
        max_tokens: descriptor.f64_value(params, "maxTokens").map(|n| n as u32),
        base_url: descriptor
            .str_value(params, "baseUrl")
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        api_key,
    }
}

/// A static key, else the named environment variable.
pub(crate) fn resolve_key(descriptor: &NodeDescriptor, params: &ValueMap, input: &str, env: &str) -> Option<String> {
    descriptor
        .str_value(params, input)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env).ok().filter(|k| !k.is_empty()))
}

/// OpenAI chat model provider.
#[derive(Clone)]
pub struct ChatOpenAiNode {
    descriptor: Arc<NodeDescriptor>,
}

impl ChatOpenAiNode {
    pub fn new() -> Self {
        Self::with_defaults(&ModelConfig::default())
    }

    /// Use `model`'s id, temperature, token limit and endpoint as input defaults.
    pub fn with_defaults(model: &ModelConfig) -> Self {
        let mut inputs = vec![
            // Falls back to OPENAI_API_KEY, then to the client's configured key
            NodeParam::new("OpenAI Api Key", "openAIApiKey", "password").optional(),
        ];
        inputs.extend(model_inputs(
            &model.model_id,
            &["gpt-4", "gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"],
            model.temperature,
            model.max_tokens,
            model.base_url.as_deref(),
        ));

        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "chatOpenAI".into(),
                label: "ChatOpenAI".into(),
                version: 1.0,
                category: "Chat Models".into(),
                description: "Wrapper around OpenAI large language models that use the Chat endpoint"
                    .into(),
                kind: NodeKind::Provider,
                base_classes: BASE_CLASSES.iter().map(|s| s.to_string()).collect(),
                inputs,
                outputs: vec![NodeOutput::new("ChatOpenAI", "chatOpenAI", BASE_CLASSES)],
            }),
        }
    }

    fn spec(&self, params: &ValueMap) -> ChatModelSpec {
        let api_key = resolve_key(&self.descriptor, params, "openAIApiKey", "OPENAI_API_KEY");
        model_spec(&self.descriptor, params, "openai", api_key)
    }
}

impl Default for ChatOpenAiNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ChatOpenAiNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let spec = self.spec(params);
            tracing::debug!(node_id = %ctx.node_id, model = %spec.model_name, "Configured chat model");

            Ok(json!({
                "type": "ChatOpenAI",
                "config": spec,
                "baseClasses": BASE_CLASSES,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::context;

    #[tokio::test]
    async fn test_defaults() {
        let node = ChatOpenAiNode::new();
        let mut params = ValueMap::new();
        params.insert("openAIApiKey".into(), json!("sk-test"));

        let out = node
            .execute(NodeCall::Provider { params }, context("chatOpenAI_0", ""))
            .await
            .unwrap();
        assert_eq!(out["type"], "ChatOpenAI");
        assert_eq!(out["config"]["model_name"], "gpt-3.5-turbo");
        assert_eq!(out["config"]["api_key"], "sk-test");
        assert!((out["config"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(out["baseClasses"][2], "BaseLanguageModel");
    }

    #[tokio::test]
    async fn test_string_temperature_and_model() {
        let node = ChatOpenAiNode::new();
        let mut params = ValueMap::new();
        params.insert("openAIApiKey".into(), json!("sk-test"));
        params.insert("modelName".into(), json!("gpt-4"));
        params.insert("temperature".into(), json!("0.1"));

        let out = node
            .execute(NodeCall::Provider { params }, context("chatOpenAI_0", ""))
            .await
            .unwrap();
        let spec: ChatModelSpec = serde_json::from_value(out["config"].clone()).unwrap();
        assert_eq!(spec.model_name, "gpt-4");
        assert!((spec.temperature - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rejects_wrong_call_shape() {
        let node = ChatOpenAiNode::new();
        let call = NodeCall::Terminator {
            params: ValueMap::new(),
            upstream: json!("x"),
        };
        assert!(node.execute(call, context("chatOpenAI_0", "")).await.is_err());
    }

    #[tokio::test]
    async fn test_configured_defaults() {
        let model = ModelConfig {
            model_id: "gpt-4o".into(),
            temperature: 0.2,
            max_tokens: Some(256),
            base_url: Some("http://localhost:11434/v1/chat/completions".into()),
            ..ModelConfig::default()
        };
        let node = ChatOpenAiNode::with_defaults(&model);
        let out = node
            .execute(
                NodeCall::Provider {
                    params: ValueMap::new(),
                },
                context("chatOpenAI_0", ""),
            )
            .await
            .unwrap();
        let spec: ChatModelSpec = serde_json::from_value(out["config"].clone()).unwrap();
        assert_eq!(spec.provider, "openai");
        assert_eq!(spec.model_name, "gpt-4o");
        assert!((spec.temperature - 0.2).abs() < 1e-6);
        assert_eq!(spec.max_tokens, Some(256));
        assert_eq!(spec.base_url.as_deref(), Some("http://localhost:11434/v1/chat/completions"));
    }

    #[test]
    fn test_validates_without_static_key() {
        let node = ChatOpenAiNode::new();
        assert!(node.validate_inputs("chatOpenAI_0", &ValueMap::new()).is_ok());
    }
}
