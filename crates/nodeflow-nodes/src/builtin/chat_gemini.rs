use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::Result;
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::chat_openai::{model_inputs, model_spec, resolve_key};
use super::wrong_call;

const BASE_CLASSES: &[&str] = &["ChatGoogleGenerativeAI", "BaseChatModel", "BaseLanguageModel"];

const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Google Gemini chat model provider.
#[derive(Clone)]
pub struct ChatGeminiNode {
    descriptor: Arc<NodeDescriptor>,
}

impl ChatGeminiNode {
    pub fn new() -> Self {
        Self::build(DEFAULT_MODEL, 0.7, None, None)
    }

    /// Use `model`'s settings as input defaults.
    pub fn with_defaults(model: &ModelConfig) -> Self {
        Self::build(
            &model.model_id,
            model.temperature,
            model.max_tokens,
            model.base_url.as_deref(),
        )
    }

    fn build(model_id: &str, temperature: f32, max_tokens: Option<u32>, base_url: Option<&str>) -> Self {
        let mut inputs = vec![
            // Falls back to GOOGLE_API_KEY
            NodeParam::new("Google Api Key", "googleApiKey", "password").optional(),
        ];
        inputs.extend(model_inputs(
            model_id,
            &["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash"],
            temperature,
            max_tokens,
            base_url,
        ));

        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "chatGoogleGemini".into(),
                label: "ChatGoogleGemini".into(),
                version: 1.0,
                category: "Chat Models".into(),
                description: "Wrapper around Google Gemini large language models".into(),
                kind: NodeKind::Provider,
                base_classes: BASE_CLASSES.iter().map(|s| s.to_string()).collect(),
                inputs,
                outputs: vec![NodeOutput::new("ChatGoogleGemini", "chatGoogleGemini", BASE_CLASSES)],
            }),
        }
    }
}

impl Default for ChatGeminiNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ChatGeminiNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let api_key = resolve_key(&self.descriptor, params, "googleApiKey", "GOOGLE_API_KEY");
            let spec = model_spec(&self.descriptor, params, "gemini", api_key);
            tracing::debug!(node_id = %ctx.node_id, model = %spec.model_name, "Configured Gemini model");

            Ok(json!({
                "type": "ChatGoogleGemini",
                "config": spec,
                "baseClasses": BASE_CLASSES,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::chat_openai::ChatModelSpec;
    use crate::builtin::context;

    #[tokio::test]
    async fn test_defaults() {
        let node = ChatGeminiNode::new();
        let mut params = ValueMap::new();
        params.insert("googleApiKey".into(), json!("g-test"));

        let out = node
            .execute(NodeCall::Provider { params }, context("chatGoogleGemini_0", ""))
            .await
            .unwrap();
        let spec: ChatModelSpec = serde_json::from_value(out["config"].clone()).unwrap();
        assert_eq!(out["type"], "ChatGoogleGemini");
        assert_eq!(spec.provider, "gemini");
        assert_eq!(spec.model_name, "gemini-1.5-flash");
        assert_eq!(spec.api_key.as_deref(), Some("g-test"));
        assert!((spec.temperature - 0.7).abs() < 1e-6);
        assert_eq!(out["baseClasses"][2], "BaseLanguageModel");
    }

    #[tokio::test]
    async fn test_configured_defaults() {
        let model = ModelConfig {
            provider: "gemini".into(),
            model_id: "gemini-1.5-pro".into(),
            temperature: 0.3,
            ..ModelConfig::default()
        };
        let node = ChatGeminiNode::with_defaults(&model);
        let mut params = ValueMap::new();
        params.insert("googleApiKey".into(), json!("g-test"));

        let out = node
            .execute(NodeCall::Provider { params }, context("chatGoogleGemini_0", ""))
            .await
            .unwrap();
        let spec: ChatModelSpec = serde_json::from_value(out["config"].clone()).unwrap();
        assert_eq!(spec.model_name, "gemini-1.5-pro");
        assert!((spec.temperature - 0.3).abs() < 1e-6);
        assert!(spec.max_tokens.is_none());
    }

    #[test]
    fn test_output_matches_language_model_inputs() {
        let node = ChatGeminiNode::new();
        let output = node.descriptor().output("chatGoogleGemini").unwrap();
        assert!(output.provides("BaseLanguageModel"));
        assert!(node.validate_inputs("chatGoogleGemini_0", &ValueMap::new()).is_ok());
    }
}
