use crate::error::ApiError;
use crate::middleware::{auth_middleware, AuthConfig};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    middleware as axum_mw,
    routing::{get, post},
    Json, Router,
};
use colloquy_agent::ResponseOrchestrator;
use colloquy_core::{Attachment, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

/// Shared application state.
pub struct AppState {
    /// Runs every chat request cycle.
    pub orchestrator: Arc<ResponseOrchestrator>,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router. Chat routes sit behind `auth` when it has keys;
    /// `/health` is always open.
    pub fn build(orchestrator: Arc<ResponseOrchestrator>, auth: AuthConfig) -> Router {
        let state = Arc::new(AppState { orchestrator });

        let mut api = Router::new()
            .route("/api/chat", post(chat_handler))
            .route(
                "/api/chat/{chat_id}",
                get(transcript_handler).delete(remove_handler),
            )
            .route("/api/chat/{chat_id}/retry", post(retry_handler))
            .with_state(state);

        if auth.is_enabled() {
            info!(keys = auth.api_keys.len(), "API key authentication enabled");
            api = api.layer(
                ServiceBuilder::new()
                    .layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware)),
            );
        }

        Router::new().route("/health", get(health_handler)).merge(api)
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Session key. Required.
    #[serde(default)]
    pub chat_id: Option<String>,
    /// User text; may be empty when attachments are present.
    #[serde(default)]
    pub message: Option<String>,
    /// Files with base64 `data`.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Reply to a chat or retry request.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The assistant's reply text.
    pub response: String,
    /// The recorded assistant turn.
    pub turn: Turn,
}

impl From<Turn> for ChatResponse {
    fn from(turn: Turn) -> Self {
        Self {
            response: turn.content().to_string(),
            turn,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptResponse {
    chat_id: String,
    turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveResponse {
    chat_id: String,
    removed: bool,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "colloquy"}))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let chat_id = request
        .chat_id
        .ok_or_else(|| ApiError::bad_request("missing_chat_id", "Chat ID is required"))?;
    let message = request.message.unwrap_or_default();

    let turn = state
        .orchestrator
        .handle_message(&chat_id, &message, request.attachments)
        .await?;
    Ok(Json(turn.into()))
}

async fn retry_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let turn = state.orchestrator.retry_pending(&chat_id).await?;
    Ok(Json(turn.into()))
}

async fn transcript_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let transcript = state.orchestrator.read_transcript(&chat_id).await?;
    Ok(Json(TranscriptResponse {
        chat_id,
        turns: transcript.into_turns(),
    }))
}

async fn remove_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let removed = state.orchestrator.store().remove(&chat_id).await?;
    Ok(Json(RemoveResponse { chat_id, removed }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use colloquy_agent::{ChatConfig, CompletionGateway};
    use colloquy_core::CompletionError;
    use colloquy_session::SessionStore;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait::async_trait]
    impl CompletionGateway for Echo {
        async fn complete(&self, _system_prompt: &str, turns: &[Turn]) -> Result<String, CompletionError> {
            Ok(format!("echo: {}", turns.last().map(Turn::content).unwrap_or_default()))
        }
    }

    fn app(auth: AuthConfig) -> Router {
        let orchestrator = ResponseOrchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(Echo),
            &ChatConfig::default(),
        );
        GatewayServer::build(Arc::new(orchestrator), auth)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn chat_returns_reply() {
        let response = app(AuthConfig::default())
            .oneshot(post_chat(r#"{"chatId":"s1","message":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["response"], "echo: ping");
        assert_eq!(body["turn"]["role"], "assistant");
    }

    #[tokio::test]
    async fn missing_chat_id_is_bad_request() {
        let response = app(AuthConfig::default())
            .oneshot(post_chat(r#"{"message":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "missing_chat_id");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let response = app(AuthConfig::default())
            .oneshot(post_chat("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "invalid_body");
    }

    #[tokio::test]
    async fn health_skips_auth() {
        let response = app(AuthConfig::new(vec!["secret".into()]))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_requires_key_when_enabled() {
        let response = app(AuthConfig::new(vec!["secret".into()]))
            .oneshot(post_chat(r#"{"chatId":"s1","message":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
