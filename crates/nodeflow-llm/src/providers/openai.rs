use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

use super::configured_key;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
///
/// Key and endpoint given on a request win over the client defaults.
pub struct OpenAiClient {
    http: Client,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = configured_key(api_key);
        self
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn role_name(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn build_body(request: &CompletionRequest) -> ChatRequest<'_> {
    // o-series models reject temperature
    let is_o_series = request.model_id.starts_with("o1")
        || request.model_id.starts_with("o3")
        || request.model_id.starts_with("o4");

    ChatRequest {
        model: &request.model_id,
        messages: request
            .messages
            .iter()
            .map(|m| OaiMessage {
                role: role_name(&m.role),
                content: &m.content,
            })
            .collect(),
        max_tokens: request.max_tokens,
        temperature: if is_o_series {
            None
        } else {
            Some(request.temperature)
        },
        stream: false,
    }
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| NodeflowError::LlmParse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| NodeflowError::LlmParse("response contained no message content".into()))
}

impl LlmClient for OpenAiClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = request
                .base_url
                .as_deref()
                .or(self.base_url.as_deref())
                .unwrap_or(OPENAI_API_URL);
            let api_key = request.api_key.as_deref().or(self.api_key.as_deref());
            // Self-hosted endpoints may run without a key
            if api_key.is_none() && url == OPENAI_API_URL {
                return Err(NodeflowError::LlmRequest("OpenAI API Key is required.".into()));
            }
            let body = build_body(&request);

            let mut req = self.http.post(url).json(&body);
            if let Some(api_key) = api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            debug!(model = %request.model_id, messages = request.messages.len(), "Sending chat completion");

            let response = req
                .send()
                .await
                .map_err(|e| NodeflowError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(NodeflowError::LlmRequest(format!(
                    "HTTP {}: {}",
                    status, body
                )));
            }

            let text = response
                .text()
                .await
                .map_err(|e| NodeflowError::LlmRequest(e.to_string()))?;
            parse_response(&text)
        })
    }
}
