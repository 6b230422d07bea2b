pub mod providers;
pub mod retry;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::traits::LlmClient;

pub use providers::gemini::GeminiClient;
pub use providers::openai::OpenAiClient;
pub use providers::ProviderRouter;
pub use retry::RetryingClient;

/// Create the LLM client shared by chain nodes.
///
/// Requests are routed per call on their `provider`. The configured key and
/// endpoint belong to the backend named by `config.provider`; the other
/// backend relies on keys carried by the request. A `[model.retry]` section
/// wraps the router in a [`RetryingClient`].
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    let (openai, gemini) = if config.uses_gemini() {
        (
            OpenAiClient::new(),
            GeminiClient::new()
                .with_api_key(config.api_key.clone())
                .with_base_url(config.base_url.clone()),
        )
    } else {
        (
            OpenAiClient::new()
                .with_api_key(config.api_key.clone())
                .with_base_url(config.base_url.clone()),
            GeminiClient::new(),
        )
    };
    let client: Box<dyn LlmClient> = Box::new(ProviderRouter::new(Box::new(openai), Box::new(gemini)));

    match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    }
}
