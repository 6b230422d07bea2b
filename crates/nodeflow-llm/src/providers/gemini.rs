use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

use super::configured_key;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl GeminiClient {
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

    /// Override the API root (`.../v1beta`).
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    temperature: f32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: text.to_string(),
    }
}

fn build_body(request: &CompletionRequest) -> GeminiRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => system_parts.push(text_part(&msg.content)),
            Role::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![text_part(&msg.content)],
            }),
            Role::Assistant => contents.push(GeminiContent {
                role: Some("model".to_string()),
                parts: vec![text_part(&msg.content)],
            }),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system_parts,
        }),
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
        },
    }
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: GeminiResponse =
        serde_json::from_str(body).map_err(|e| NodeflowError::LlmParse(e.to_string()))?;
    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| NodeflowError::LlmParse("response contained no candidates".into()))?;

    Ok(content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

impl LlmClient for GeminiClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let api_key = request
                .api_key
                .as_deref()
                .or(self.api_key.as_deref())
                .ok_or_else(|| NodeflowError::LlmRequest("Google API Key is required.".into()))?;
            let base = request
                .base_url
                .as_deref()
                .or(self.base_url.as_deref())
                .unwrap_or(GEMINI_API_BASE)
                .trim_end_matches('/');
            let url = format!("{}/models/{}:generateContent", base, request.model_id);

            debug!(model = %request.model_id, messages = request.messages.len(), "Sending Gemini request");

            let response = self
                .http
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&build_body(&request))
                .send()
                .await
                .map_err(|e| NodeflowError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(NodeflowError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let text = response
                .text()
                .await
                .map_err(|e| NodeflowError::LlmRequest(e.to_string()))?;
            parse_response(&text)
        })
    }
}
