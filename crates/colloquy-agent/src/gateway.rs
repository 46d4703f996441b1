use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::config::{LlmProvider, ModelConfig};
use crate::failover::FailoverGateway;
use async_trait::async_trait;
use colloquy_core::{CompletionError, Turn};
use std::sync::Arc;

/// Turns an ordered transcript into one externally produced reply.
///
/// Implementations hide provider-specific prompt construction and
/// transport. They must treat `turns` as read-only and must not retry on
/// their own; retries belong to a wrapping decorator such as
/// [`FailoverGateway`].
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `CompletionGateway` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in [`build_gateway`]
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Produces the assistant's reply to `turns`, preceded by
    /// `system_prompt`.
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, CompletionError>;
}

#[async_trait]
impl<T: CompletionGateway + ?Sized> CompletionGateway for Arc<T> {
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, CompletionError> {
        (**self).complete(system_prompt, turns).await
    }
}

fn backend_for(config: &ModelConfig) -> Box<dyn CompletionGateway> {
    match config.provider {
        LlmProvider::Claude => Box::new(ClaudeBackend::new(config.clone())),
        LlmProvider::Groq | LlmProvider::OpenAi | LlmProvider::OpenRouter => {
            Box::new(OpenAiBackend::new(config.clone()))
        }
    }
}

/// Builds the gateway described by `config`.
///
/// A plain backend is returned unless a retry policy or fallback models are
/// configured, in which case the primary and its fallbacks are wrapped in a
/// [`FailoverGateway`].
pub fn build_gateway(config: &ModelConfig) -> Arc<dyn CompletionGateway> {
    if config.retry_policy.is_none() && config.fallback_models.is_empty() {
        return Arc::from(backend_for(config));
    }

    let mut backends = vec![backend_for(config)];
    backends.extend(config.fallback_models.iter().map(backend_for));
    let policy = config.retry_policy.clone().unwrap_or_default();
    Arc::new(FailoverGateway::new(backends, policy))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_backend_reports_transport_error() {
        let config = ModelConfig {
            api_key: "test-key".into(),
            // Non-routable port so the HTTP client fails fast.
            api_base_url: Some("http://127.0.0.1:1".into()),
            ..ModelConfig::default()
        };
        let gateway = build_gateway(&config);
        let err = gateway
            .complete("sys", &[Turn::user("hi", vec![])])
            .await
            .unwrap_err();
        assert_eq!(err.kind, colloquy_core::CompletionErrorKind::Transport);
    }
}
