use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input and result values flowing through a graph.
pub type ValueMap = BTreeMap<String, serde_json::Value>;

/// Unique session identifier, also used as the run correlation token.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a node consumes graph dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// No incoming dependencies; builds a value from static inputs.
    Provider,
    /// Combines any number of upstream values with static inputs.
    Processor,
    /// Transforms exactly one upstream value.
    Terminator,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Processor => write!(f, "processor"),
            Self::Terminator => write!(f, "terminator"),
        }
    }
}

/// A selectable value for an `options` parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamOption {
    pub label: String,
    pub name: String,
}

/// A declared node input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParam {
    pub label: String,
    pub name: String,
    /// Capability tag or primitive type the input expects.
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub is_connection: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParamOption>,
}

fn default_required() -> bool {
    true
}

impl NodeParam {
    /// A required, non-optional input with no default.
    pub fn new(
        label: impl Into<String>,
        name: impl Into<String>,
        param_type: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            optional: false,
            default: None,
            is_connection: false,
            options: vec![],
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark the input as fed by an edge rather than typed in by the user.
    pub fn connection(mut self) -> Self {
        self.is_connection = true;
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options
            .iter()
            .map(|o| ParamOption {
                label: o.to_string(),
                name: o.to_string(),
            })
            .collect();
        self
    }

    /// Whether a run cannot proceed unless this input is supplied.
    pub fn must_be_supplied(&self) -> bool {
        self.required && !self.optional && self.default.is_none()
    }
}

/// A declared node output and the capability tags it provides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutput {
    pub label: String,
    pub name: String,
    pub base_classes: Vec<String>,
}

impl NodeOutput {
    pub fn new(label: impl Into<String>, name: impl Into<String>, base_classes: &[&str]) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            base_classes: base_classes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Literal tag membership; no tag implies any other.
    pub fn provides(&self, tag: &str) -> bool {
        self.base_classes.iter().any(|c| c == tag)
    }
}

/// Everything a registered node type declares about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Registry key.
    pub name: String,
    pub label: String,
    pub version: f32,
    pub category: String,
    pub description: String,
    #[serde(rename = "nodeType")]
    pub kind: NodeKind,
    pub base_classes: Vec<String>,
    pub inputs: Vec<NodeParam>,
    pub outputs: Vec<NodeOutput>,
}

impl NodeDescriptor {
    pub fn input(&self, name: &str) -> Option<&NodeParam> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&NodeOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Look up an input value, falling back to the declared default.
    /// Explicit `null` is treated as absent.
    pub fn value<'a>(&'a self, inputs: &'a ValueMap, name: &str) -> Option<&'a serde_json::Value> {
        inputs
            .get(name)
            .filter(|v| !v.is_null())
            .or_else(|| self.input(name).and_then(|p| p.default.as_ref()))
    }

    pub fn str_value<'a>(&'a self, inputs: &'a ValueMap, name: &str) -> Option<&'a str> {
        self.value(inputs, name).and_then(|v| v.as_str())
    }

    /// Booleans may arrive as `"true"`/`"false"` from forms.
    pub fn bool_value(&self, inputs: &ValueMap, name: &str) -> Option<bool> {
        match self.value(inputs, name)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric inputs arrive as numbers from JSON and as strings from forms.
    pub fn f64_value(&self, inputs: &ValueMap, name: &str) -> Option<f64> {
        match self.value(inputs, name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Per-invocation context handed to a node.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub node_id: String,
    /// The user query the whole run answers.
    pub input_text: String,
    pub correlation_id: SessionId,
}

/// The arguments of one node execution, shaped by the node's kind.
#[derive(Debug, Clone)]
pub enum NodeCall {
    Provider {
        params: ValueMap,
    },
    Processor {
        params: ValueMap,
        connected: ValueMap,
    },
    Terminator {
        params: ValueMap,
        upstream: serde_json::Value,
    },
}

impl NodeCall {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Provider { .. } => NodeKind::Provider,
            Self::Processor { .. } => NodeKind::Processor,
            Self::Terminator { .. } => NodeKind::Terminator,
        }
    }

    /// Static (user-supplied) inputs.
    pub fn params(&self) -> &ValueMap {
        match self {
            Self::Provider { params }
            | Self::Processor { params, .. }
            | Self::Terminator { params, .. } => params,
        }
    }
}

/// Best-effort plain text of a node result.
///
/// Strings are returned as-is; objects are searched for the usual text
/// fields produced by chains, prompts and loaders; anything else is
/// rendered as JSON.
pub fn text_content(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Object(map) => {
            for key in ["response", "text", "content", "formatted", "pageContent"] {
                if let Some(serde_json::Value::String(s)) = map.get(key) {
                    return s.clone();
                }
            }
            value.to_string()
        }
        serde_json::Value::Array(items) => items
            .iter()
            .map(text_content)
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => other.to_string(),
    }
}

/// Role in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// A single non-streaming chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Backend family, e.g. `openai` or `gemini`.
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub messages: Vec<ChatMessage>,
}

fn default_provider() -> String {
    "openai".to_string()
}
