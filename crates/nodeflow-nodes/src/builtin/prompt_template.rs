use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::error::Result;
use nodeflow_core::traits::Node;
use nodeflow_core::types::*;

use super::{json_object, wrong_call};

const BASE_CLASSES: &[&str] = &["PromptTemplate", "BaseStringPromptTemplate", "BasePromptTemplate"];
const DEFAULT_TEMPLATE: &str = "You are a helpful assistant. {input}";

#[derive(Clone)]
pub struct PromptTemplateNode {
    descriptor: Arc<NodeDescriptor>,
}

impl PromptTemplateNode {
    pub fn new() -> Self {
        Self {
            descriptor: Arc::new(NodeDescriptor {
                name: "promptTemplate".into(),
                label: "Prompt Template".into(),
                version: 1.0,
                category: "Prompts".into(),
                description: "Schema to represent a basic prompt for an LLM".into(),
                kind: NodeKind::Provider,
                base_classes: BASE_CLASSES.iter().map(|s| s.to_string()).collect(),
                inputs: vec![
                    NodeParam::new("Template", "template", "string")
                        .with_default(json!(DEFAULT_TEMPLATE)),
                    NodeParam::new("Format Prompt Values", "promptValues", "json").optional(),
                ],
                outputs: vec![NodeOutput::new("Prompt Template", "promptTemplate", BASE_CLASSES)],
            }),
        }
    }
}

impl Default for PromptTemplateNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute `{input}` with the run input and `{key}` with each prompt value.
pub fn format_template(
    template: &str,
    input: &str,
    values: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut formatted = template.replace("{input}", input);
    for (key, value) in values {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        formatted = formatted.replace(&format!("{{{}}}", key), &text);
    }
    formatted
}

/// Placeholder names in declaration order, without duplicates.
fn input_variables(template: &str) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else { break };
        let name = &after[..end];
        if !name.is_empty()
            && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            && !vars.iter().any(|v| v == name)
        {
            vars.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    vars
}

impl Node for PromptTemplateNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn execute(&self, call: NodeCall, ctx: NodeContext) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let NodeCall::Provider { params } = &call else {
                return Err(wrong_call(&ctx, NodeKind::Provider, &call));
            };
            let template = self
                .descriptor
                .str_value(params, "template")
                .unwrap_or(DEFAULT_TEMPLATE);
            let values = json_object(&ctx, "promptValues", params.get("promptValues"))?;

            let formatted = format_template(template, &ctx.input_text, &values);

            Ok(json!({
                "type": "PromptTemplate",
                "template": template,
                "inputVariables": input_variables(template),
                "formatted": formatted,
                "baseClasses": BASE_CLASSES,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::context;

    #[test]
    fn test_format_template() {
        let mut values = serde_json::Map::new();
        values.insert("lang".into(), json!("Turkish"));
        values.insert("n".into(), json!(3));
        let out = format_template("Answer in {lang} with {n} words: {input}", "merhaba", &values);
        assert_eq!(out, "Answer in Turkish with 3 words: merhaba");
    }

    #[test]
    fn test_input_variables() {
        assert_eq!(
            input_variables("{input} and {lang}, again {input} {not valid}"),
            vec!["input".to_string(), "lang".to_string()]
        );
        assert!(input_variables("no placeholders").is_empty());
    }

    #[tokio::test]
    async fn test_default_template() {
        let node = PromptTemplateNode::new();
        let out = node
            .execute(
                NodeCall::Provider {
                    params: ValueMap::new(),
                },
                context("prompt_0", "merhaba"),
            )
            .await
            .unwrap();
        assert_eq!(out["formatted"], "You are a helpful assistant. merhaba");
        assert_eq!(out["baseClasses"][2], "BasePromptTemplate");
    }

    #[tokio::test]
    async fn test_prompt_values_as_json_string() {
        let node = PromptTemplateNode::new();
        let mut params = ValueMap::new();
        params.insert("template".into(), json!("Hi {name}: {input}"));
        params.insert("promptValues".into(), json!(r#"{"name": "Ada"}"#));
        let out = node
            .execute(NodeCall::Provider { params }, context("prompt_0", "ping"))
            .await
            .unwrap();
        assert_eq!(out["formatted"], "Hi Ada: ping");
    }

    #[tokio::test]
    async fn test_invalid_prompt_values() {
        let node = PromptTemplateNode::new();
        let mut params = ValueMap::new();
        params.insert("promptValues".into(), json!("{not json"));
        let err = node
            .execute(NodeCall::Provider { params }, context("prompt_0", "ping"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("promptValues"));
    }
}
