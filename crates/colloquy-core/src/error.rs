use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A convenience `Result` alias using [`ColloquyError`].
pub type ColloquyResult<T> = Result<T, ColloquyError>;

/// Top-level error type for Colloquy.
///
/// Validation variants are returned before any state is touched. Every other
/// variant is scoped to the single request that produced it.
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// The session key was empty or malformed.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// The message had neither text nor attachments.
    #[error("Message is empty: provide text or at least one attachment")]
    EmptyMessage,

    /// The external completion call failed. The user turn stays recorded.
    #[error("Completion failed: {0}")]
    CompletionFailed(#[from] CompletionError),

    /// A retry was requested but the session has no unanswered user turn.
    #[error("Nothing to retry for session {0}")]
    NothingToRetry(String),

    /// An error related to session storage or the transcript journal.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP surface.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ColloquyError {
    /// Short machine-readable name of the variant, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ColloquyError::InvalidSessionId(_) => "invalid_session_id",
            ColloquyError::EmptyMessage => "empty_message",
            ColloquyError::CompletionFailed(_) => "completion_failed",
            ColloquyError::NothingToRetry(_) => "nothing_to_retry",
            ColloquyError::Session(_) => "session",
            ColloquyError::Config(_) => "config",
            ColloquyError::Gateway(_) => "gateway",
            ColloquyError::Json(_) => "json",
            ColloquyError::Io(_) => "io",
        }
    }

    /// Whether the failure was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ColloquyError::InvalidSessionId(_)
                | ColloquyError::EmptyMessage
                | ColloquyError::NothingToRetry(_)
        )
    }
}

/// Category of a failed completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "category")]
pub enum CompletionErrorKind {
    /// The request never produced an HTTP response (DNS, connect, reset).
    Transport,
    /// The call exceeded its deadline.
    Timeout,
    /// The provider rejected the call with HTTP 429.
    RateLimited,
    /// The provider rejected the credentials (401/403).
    Unauthorized,
    /// Any other non-success HTTP status.
    Provider {
        /// HTTP status code returned by the provider.
        status: u16,
    },
    /// The provider answered but the body could not be understood.
    MalformedResponse,
}

impl fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionErrorKind::Transport => write!(f, "transport"),
            CompletionErrorKind::Timeout => write!(f, "timeout"),
            CompletionErrorKind::RateLimited => write!(f, "rate limited"),
            CompletionErrorKind::Unauthorized => write!(f, "unauthorized"),
            CompletionErrorKind::Provider { status } => write!(f, "provider status {status}"),
            CompletionErrorKind::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

/// Failure of an external completion call, with enough detail for a caller
/// to decide between retrying and surfacing the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CompletionError {
    /// Failure category.
    pub kind: CompletionErrorKind,
    /// Human-readable detail (provider body, transport error text).
    pub message: String,
}

impl CompletionError {
    /// Creates an error of the given kind.
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Transport, message)
    }

    /// A deadline was exceeded.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Timeout, message)
    }

    /// The provider answered with something we could not parse.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::MalformedResponse, message)
    }

    /// Classifies a non-success HTTP status returned by a provider.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            429 => CompletionErrorKind::RateLimited,
            401 | 403 => CompletionErrorKind::Unauthorized,
            _ => CompletionErrorKind::Provider { status },
        };
        Self::new(kind, body)
    }

    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            CompletionErrorKind::RateLimited => Some(429),
            CompletionErrorKind::Provider { status } => Some(status),
            _ => None,
        }
    }

    /// Whether the same request is expected to succeed if sent again later.
    ///
    /// Transport failures, timeouts, rate limiting and 5xx responses are
    /// transient. Credential problems, other 4xx responses and malformed
    /// bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            CompletionErrorKind::Transport
            | CompletionErrorKind::Timeout
            | CompletionErrorKind::RateLimited => true,
            CompletionErrorKind::Provider { status } => status >= 500,
            CompletionErrorKind::Unauthorized | CompletionErrorKind::MalformedResponse => false,
        }
    }
}
