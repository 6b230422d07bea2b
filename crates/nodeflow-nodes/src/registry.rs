use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{LlmClient, Node};
use nodeflow_core::types::NodeDescriptor;

use crate::builtin;

/// Builds a fresh node instance.
pub type NodeFactory = Arc<dyn Fn() -> Arc<dyn Node> + Send + Sync>;

struct Entry {
    factory: NodeFactory,
    descriptor: NodeDescriptor,
}

/// Registry of available node types, keyed by type id.
///
/// Populated up front, then shared read-only behind an `Arc`.
pub struct NodeRegistry {
    entries: HashMap<String, Entry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a factory, replacing any previous entry for `type_id`.
    pub fn register(&mut self, type_id: impl Into<String>, factory: NodeFactory) {
        let type_id = type_id.into();
        let descriptor = factory().descriptor().clone();
        debug!(type_id = %type_id, category = %descriptor.category, "Registered node type");
        self.entries.insert(type_id, Entry { factory, descriptor });
    }

    /// Register a node type whose instances are cheap clones of `node`.
    pub fn register_node<N: Node + Clone>(&mut self, type_id: impl Into<String>, node: N) {
        self.register(type_id, Arc::new(move || Arc::new(node.clone()) as Arc<dyn Node>));
    }

    /// Unregister a node type.
    pub fn unregister(&mut self, type_id: &str) -> bool {
        self.entries.remove(type_id).is_some()
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.entries.contains_key(type_id)
    }

    /// Instantiate a node of the given type.
    pub fn create(&self, type_id: &str) -> Result<Arc<dyn Node>> {
        self.entries
            .get(type_id)
            .map(|e| (e.factory)())
            .ok_or_else(|| NodeflowError::UnknownNodeType(type_id.to_string()))
    }

    pub fn descriptor(&self, type_id: &str) -> Option<&NodeDescriptor> {
        self.entries.get(type_id).map(|e| &e.descriptor)
    }

    /// Every registered type's declaration, sorted by type id.
    pub fn list_all(&self) -> Vec<(&str, &NodeDescriptor)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(id, e)| (id.as_str(), &e.descriptor))
            .collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register every built-in node type. Calling this again overwrites
    /// the same entries with equivalent factories.
    ///
    /// `model` supplies the input defaults of the chat node matching its
    /// provider; the other chat node keeps its own defaults.
    pub fn register_builtins(&mut self, llm: Arc<dyn LlmClient>, model: &ModelConfig) {
        // ── Chat Models ─────────────────────────────────────────
        let (openai, gemini) = if model.uses_gemini() {
            (
                builtin::chat_openai::ChatOpenAiNode::new(),
                builtin::chat_gemini::ChatGeminiNode::with_defaults(model),
            )
        } else {
            (
                builtin::chat_openai::ChatOpenAiNode::with_defaults(model),
                builtin::chat_gemini::ChatGeminiNode::new(),
            )
        };
        self.register_node("chatOpenAI", openai);
        self.register_node("chatGoogleGemini", gemini);

        // ── Prompts ─────────────────────────────────────────────
        self.register_node("promptTemplate", builtin::prompt_template::PromptTemplateNode::new());

        // ── Chains ──────────────────────────────────────────────
        self.register_node("llmChain", builtin::llm_chain::LlmChainNode::new(llm));

        // ── Output Parsers ──────────────────────────────────────
        self.register_node(
            "stringOutputParser",
            builtin::output_parser::StringOutputParserNode::new(),
        );

        // ── Document Loaders ────────────────────────────────────
        self.register_node("webLoader", builtin::web_loader::WebLoaderNode::new());
        self.register_node("sitemapLoader", builtin::sitemap_loader::SitemapLoaderNode::new());
        self.register_node("githubLoader", builtin::github_loader::GithubLoaderNode::new());

        // ── Utilities ───────────────────────────────────────────
        self.register_node("testHello", builtin::test_hello::TestHelloNode::new());
    }

    /// Create a registry with all built-in node types registered.
    pub fn with_builtins(llm: Arc<dyn LlmClient>) -> Self {
        Self::with_config(llm, &ModelConfig::default())
    }

    /// Like [`with_builtins`](Self::with_builtins), taking chat model
    /// defaults from `model`.
    pub fn with_config(llm: Arc<dyn LlmClient>, model: &ModelConfig) -> Self {
        let mut registry = Self::new();
        registry.register_builtins(llm, model);
        registry
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
