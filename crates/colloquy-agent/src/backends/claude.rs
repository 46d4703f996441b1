use super::{render_content, transport_error};
use crate::config::ModelConfig;
use crate::gateway::CompletionGateway;
use async_trait::async_trait;
use colloquy_core::{CompletionError, Role, Turn};
use serde::Serialize;

/// Claude (Anthropic) API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    /// Backend for `config`'s model with a fresh HTTP client.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

fn build_messages(turns: &[Turn]) -> Vec<ClaudeMessage> {
    turns
        .iter()
        .map(|t| ClaudeMessage {
            role: match t.role() {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: render_content(t),
        })
        .collect()
}

#[async_trait]
impl CompletionGateway for ClaudeBackend {
    async fn complete(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, CompletionError> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": build_messages(turns),
        });

        if !system_prompt.is_empty() {
            body["system"] = serde_json::json!(system_prompt);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Claude", e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error("Claude", e))?;

        if !status.is_success() {
            return Err(CompletionError::from_status(
                status.as_u16(),
                format!("Claude API error {status}: {text}"),
            ));
        }

        let resp_body: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CompletionError::malformed(format!("invalid JSON body: {e}")))?;
        parse_claude_response(&resp_body)
    }
}

/// Joins the `text` blocks of a Messages API response.
pub fn parse_claude_response(body: &serde_json::Value) -> Result<String, CompletionError> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| CompletionError::malformed("missing content in Claude response"))?;

    let text_parts: Vec<&str> = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();

    if text_parts.is_empty() {
        return Err(CompletionError::malformed("Claude response has no text blocks"));
    }
    Ok(text_parts.join("\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use colloquy_core::CompletionErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_joins_text_blocks() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": "world"}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(parse_claude_response(&body).unwrap(), "Hello\nworld");
    }

    #[test]
    fn parse_without_content_is_malformed() {
        let err = parse_claude_response(&serde_json::json!({"type": "error"})).unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn complete_sends_system_separately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(body_partial_json(serde_json::json!({
                "system": "be brief",
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Hi there"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ClaudeBackend::new(ModelConfig {
            provider: crate::config::LlmProvider::Claude,
            api_key: "sk-ant-test".into(),
            api_base_url: Some(server.uri()),
            ..ModelConfig::default()
        });
        let reply = backend
            .complete("be brief", &[Turn::user("Hello", vec![])])
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = ClaudeBackend::new(ModelConfig {
            provider: crate::config::LlmProvider::Claude,
            api_key: "k".into(),
            api_base_url: Some(server.uri()),
            ..ModelConfig::default()
        });
        let err = backend
            .complete("", &[Turn::user("hi", vec![])])
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Provider { status: 529 });
        assert!(err.is_retryable());
    }
}
