use crate::failover::RetryPolicy;
use colloquy_core::{ColloquyError, ColloquyResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Which provider API a model is served from.
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Groq cloud inference over its OpenAI-compatible API.
    Groq,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter, OpenAI-compatible.
    OpenRouter,
    /// Anthropic messages API.
    Claude,
}

impl LlmProvider {
    /// Environment variable consulted when no API key is configured.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "GROQ_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
            LlmProvider::Claude => "ANTHROPIC_API_KEY",
        }
    }
}

/// One completion model and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider serving the model.
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Provider-side model name.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Bearer or `x-api-key` credential; empty means unset.
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Cap on generated tokens per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Tried in order when this model fails with a retryable error.
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    /// Backoff applied before moving on to a fallback.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_provider() -> LlmProvider {
    LlmProvider::Groq
}

fn default_model_id() -> String {
    "llama-3.1-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            fallback_models: Vec::new(),
            retry_policy: None,
        }
    }
}

impl ModelConfig {
    /// Endpoint root, without the API path.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Claude => "https://api.anthropic.com",
            }
        }
    }

    /// Fills an empty `api_key` (here and in every fallback) from the
    /// provider's conventional environment variable.
    pub fn resolve_api_key_from_env(&mut self) {
        if self.api_key.is_empty() {
            if let Ok(key) = std::env::var(self.provider.api_key_env()) {
                self.api_key = key;
            }
        }
        for fallback in &mut self.fallback_models {
            fallback.resolve_api_key_from_env();
        }
    }
}

/// Settings for the conversation layer itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Fixed instruction sent ahead of every transcript.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Upper bound on one completion call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Send at most this many trailing turns to the provider. `None` sends
    /// the whole transcript.
    #[serde(default)]
    pub max_context_turns: Option<usize>,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant who remembers all details the user shares with you.".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ChatConfig {
    /// Rejects settings the orchestrator cannot run with.
    pub fn validate(&self) -> ColloquyResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(ColloquyError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_context_turns == Some(0) {
            return Err(ColloquyError::Config(
                "max_context_turns must be at least 1, or omitted to send the whole transcript"
                    .into(),
            ));
        }
        Ok(())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_request_timeout_secs(),
            max_context_turns: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_groq_setup() {
        let config: ModelConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider, LlmProvider::Groq);
        assert_eq!(config.model_id, "llama-3.1-70b-versatile");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.base_url(), "https://api.groq.com/openai");
    }

    #[test]
    fn base_url_override() {
        let config = ModelConfig {
            api_base_url: Some("http://localhost:8080".into()),
            ..ModelConfig::default()
        };
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn chat_config_defaults() {
        let chat: ChatConfig = toml::from_str("max_context_turns = 20").unwrap();
        assert_eq!(chat.request_timeout_secs, 60);
        assert_eq!(chat.max_context_turns, Some(20));
        assert!(chat.system_prompt.starts_with("You are a helpful assistant"));
    }

    #[test]
    fn chat_config_rejects_zero_limits() {
        assert!(ChatConfig::default().validate().is_ok());

        let zero_timeout: ChatConfig = toml::from_str("request_timeout_secs = 0").unwrap();
        assert!(matches!(zero_timeout.validate(), Err(ColloquyError::Config(_))));

        let zero_window: ChatConfig = toml::from_str("max_context_turns = 0").unwrap();
        let err = zero_window.validate().unwrap_err();
        assert!(err.to_string().contains("max_context_turns"));
    }

    #[test]
    fn provider_env_names() {
        assert_eq!(LlmProvider::Groq.api_key_env(), "GROQ_API_KEY");
        assert_eq!(LlmProvider::Claude.api_key_env(), "ANTHROPIC_API_KEY");
    }
}
