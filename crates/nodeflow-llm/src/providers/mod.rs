pub mod gemini;
pub mod openai;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use nodeflow_core::error::Result;
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::CompletionRequest;

/// Normalize a key taken from configuration.
///
/// Empty strings and `${VAR}` references left behind by an unset
/// environment variable count as no key at all.
pub(crate) fn configured_key(key: Option<String>) -> Option<String> {
    let key = key.filter(|k| !k.trim().is_empty())?;
    if key.contains("${") {
        warn!("Ignoring API key with an unexpanded ${{...}} reference; is the variable set?");
        return None;
    }
    Some(key)
}

/// Routes each request to the backend named by its `provider` field.
///
/// `gemini`/`google` go to the Gemini client; every other provider is
/// assumed to speak the OpenAI wire format.
pub struct ProviderRouter {
    openai: Box<dyn LlmClient>,
    gemini: Box<dyn LlmClient>,
}

impl ProviderRouter {
    pub fn new(openai: Box<dyn LlmClient>, gemini: Box<dyn LlmClient>) -> Self {
        Self { openai, gemini }
    }
}

impl LlmClient for ProviderRouter {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        match request.provider.as_str() {
            "gemini" | "google" => self.gemini.complete(request),
            other => {
                if other != "openai" {
                    debug!(provider = other, "Using OpenAI-compatible client");
                }
                self.openai.complete(request)
            }
        }
    }
}
