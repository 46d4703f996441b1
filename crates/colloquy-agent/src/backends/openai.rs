use super::{render_content, transport_error};
use crate::config::{LlmProvider, ModelConfig};
use crate::gateway::CompletionGateway;
use async_trait::async_trait;
use colloquy_core::{CompletionError, Role, Turn};

/// OpenAI-compatible API backend.
///
/// Works with Groq, OpenAI, OpenRouter, and any other provider that
/// implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Backend for `config`'s model with a fresh HTTP client.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(&self, system_prompt: &str, turns: &[Turn]) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::with_capacity(turns.len() + 1);

        if !system_prompt.is_empty() {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": system_prompt
            }));
        }

        for turn in turns {
            api_messages.push(serde_json::json!({
                "role": match turn.role() {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": render_content(turn)
            }));
        }

        api_messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "Colloquy")
        } else {
            request
        }
    }
}

#[async_trait]
impl CompletionGateway for OpenAiBackend {
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, CompletionError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(system_prompt, turns),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI-compatible", e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| transport_error("OpenAI-compatible", e))?;

        if !status.is_success() {
            return Err(CompletionError::from_status(
                status.as_u16(),
                format!("OpenAI-compatible API error {status}: {text}"),
            ));
        }

        let resp_body: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CompletionError::malformed(format!("invalid JSON body: {e}")))?;
        parse_openai_response(&resp_body)
    }
}

/// Extracts the reply text from a chat-completions response body.
pub fn parse_openai_response(body: &serde_json::Value) -> Result<String, CompletionError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CompletionError::malformed("missing choices[0].message.content"))
}
