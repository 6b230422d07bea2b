//! Mocks and fixture graphs shared by the Nodeflow test suites.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::graph::{FlowEdge, FlowNode, Graph};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::CompletionRequest;

pub const DEFAULT_MOCK_RESPONSE: &str = "Merhaba! Ben yardimci bir AI asistaniyim.";

enum Scripted {
    Text(String),
    Error(String),
}

/// LLM client that replays scripted replies and records every request.
///
/// Scripted replies are consumed in order; once exhausted every call
/// returns [`DEFAULT_MOCK_RESPONSE`].
pub struct MockLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Text(text.into()));
        self
    }

    /// Script an `LlmRequest` failure with the given message.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Error(message.into()));
        self
    }

    fn push(&self, item: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
            match next {
                Some(Scripted::Text(text)) => Ok(text),
                Some(Scripted::Error(message)) => Err(NodeflowError::LlmRequest(message)),
                None => Ok(DEFAULT_MOCK_RESPONSE.to_string()),
            }
        })
    }
}

/// prompt -> chain <- model, declared prompt first.
pub fn chat_graph(id: Option<&str>) -> Graph {
    let mut graph = Graph::new("Basic chat")
        .with_node(
            FlowNode::new("promptTemplate_0", "promptTemplate")
                .with_input("template", json!("You are a helpful assistant. {input}")),
        )
        .with_node(
            FlowNode::new("chatOpenAI_0", "chatOpenAI")
                .with_input("openAIApiKey", json!("sk-test"))
                .with_input("modelName", json!("gpt-3.5-turbo"))
                .with_input("temperature", json!(0.7)),
        )
        .with_node(FlowNode::new("llmChain_0", "llmChain"))
        .with_edge(FlowEdge::new(
            "e_prompt_chain",
            "promptTemplate_0",
            "promptTemplate",
            "llmChain_0",
            "prompt",
        ))
        .with_edge(FlowEdge::new(
            "e_model_chain",
            "chatOpenAI_0",
            "chatOpenAI",
            "llmChain_0",
            "model",
        ));
    graph.id = id.map(str::to_string);
    graph
}

/// [`chat_graph`] with a string output parser after the chain.
pub fn parsed_chat_graph(id: Option<&str>) -> Graph {
    chat_graph(id)
        .with_node(FlowNode::new("stringOutputParser_0", "stringOutputParser"))
        .with_edge(FlowEdge::new(
            "e_chain_parser",
            "llmChain_0",
            "llmChain",
            "stringOutputParser_0",
            "chain",
        ))
}

/// A single node whose output feeds its own input.
pub fn self_loop_graph() -> Graph {
    Graph::new("Self loop")
        .with_id("self_loop")
        .with_node(FlowNode::new("llmChain_0", "llmChain"))
        .with_edge(FlowEdge::new(
            "e_loop",
            "llmChain_0",
            "llmChain",
            "llmChain_0",
            "prompt",
        ))
}

/// One `testHello` provider with every input satisfied by defaults.
pub fn hello_graph() -> Graph {
    Graph::new("Hello").with_node(
        FlowNode::new("testHello_0", "testHello").with_input("name", json!("Nodeflow")),
    )
}

/// A chain whose model connection was never drawn.
pub fn missing_model_graph() -> Graph {
    Graph::new("Missing model")
        .with_node(FlowNode::new("promptTemplate_0", "promptTemplate"))
        .with_node(FlowNode::new("llmChain_0", "llmChain"))
        .with_edge(FlowEdge::new(
            "e_prompt_chain",
            "promptTemplate_0",
            "promptTemplate",
            "llmChain_0",
            "prompt",
        ))
}
