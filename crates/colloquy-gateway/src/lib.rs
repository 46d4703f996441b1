//! HTTP surface for Colloquy.
//!
//! Exposes the [`ResponseOrchestrator`](colloquy_agent::ResponseOrchestrator)
//! as a small JSON API: post a message, read or delete a transcript, retry
//! a pending message.

/// JSON error bodies and status mapping.
pub mod error;
/// Bearer-token authentication.
pub mod middleware;
/// Route table and handlers.
pub mod server;

pub use error::ApiError;
pub use middleware::AuthConfig;
pub use server::GatewayServer;
