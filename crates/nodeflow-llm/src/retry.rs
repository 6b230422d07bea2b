use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use nodeflow_core::config::RetryConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::CompletionRequest;

/// An LLM client that retries transient failures with exponential backoff.
pub struct RetryingClient {
    inner: Box<dyn LlmClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn LlmClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &NodeflowError) -> bool {
    match e {
        NodeflowError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut attempt = 0;
            loop {
                match self.inner.complete(request.clone()).await {
                    Ok(text) => {
                        if attempt > 0 {
                            info!(attempts = attempt + 1, "LLM request succeeded after retry");
                        }
                        return Ok(text);
                    }
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}
