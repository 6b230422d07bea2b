use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NodeflowError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reuse compiled plans across runs of the same workflow.
    #[serde(default = "default_plan_cache")]
    pub plan_cache: bool,
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan_cache: default_plan_cache(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

fn default_plan_cache() -> bool { true }
fn default_run_timeout() -> u64 { 300 }

/// Defaults for the chat model used by chain nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: default_temperature(),
            retry: None,
        }
    }
}

impl ModelConfig {
    /// Whether `provider` names the Google Gemini backend.
    pub fn uses_gemini(&self) -> bool {
        matches!(self.provider.as_str(), "gemini" | "google")
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "gpt-3.5-turbo".to_string() }
fn default_temperature() -> f32 { 0.7 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are dropped by cleanup.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_max_age() -> u64 { 86_400 }
fn default_history_limit() -> usize { 10 }

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| NodeflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| NodeflowError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay literal
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_NODEFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_NODEFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_NODEFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_NODEFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_NODEFLOW_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.engine.plan_cache);
        assert_eq!(config.engine.run_timeout_secs, 300);
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.model.model_id, "gpt-3.5-turbo");
        assert!(config.model.retry.is_none());
        assert_eq!(config.sessions.max_age_secs, 86_400);
        assert_eq!(config.sessions.history_limit, 10);
    }

    #[test]
    fn test_partial_sections() {
        let toml_str = r#"
[engine]
plan_cache = false

[model]
model_id = "gpt-4"
temperature = 0.2

[model.retry]
max_retries = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.engine.plan_cache);
        assert_eq!(config.engine.run_timeout_secs, 300);
        assert_eq!(config.model.model_id, "gpt-4");
        assert!((config.model.temperature - 0.2).abs() < f32::EPSILON);
        let retry = config.model.retry.unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_backoff_ms, 1000);
    }

    #[test]
    fn test_uses_gemini() {
        let mut model = ModelConfig::default();
        assert!(!model.uses_gemini());
        model.provider = "google".into();
        assert!(model.uses_gemini());
        model.provider = "ollama".into();
        assert!(!model.uses_gemini());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/nodeflow.toml")).unwrap_err();
        assert!(matches!(err, NodeflowError::ConfigNotFound(_)));

        let config = AppConfig::load_or_default(Path::new("/nonexistent/nodeflow.toml")).unwrap();
        assert!(config.engine.plan_cache);
    }
}
