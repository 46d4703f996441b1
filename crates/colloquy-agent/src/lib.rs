//! Completion gateway and response orchestration for Colloquy.
//!
//! # Main types
//!
//! - [`CompletionGateway`]: Provider-neutral "transcript in, text out" call.
//! - [`FailoverGateway`]: Retry/failover decorator around other gateways.
//! - [`ResponseOrchestrator`]: Runs one append → complete → append cycle
//!   per request under the session's exclusion slot.
//! - [`ModelConfig`] / [`ChatConfig`]: Provider and chat settings.

/// Provider HTTP backends.
pub mod backends;
/// Model and chat configuration.
pub mod config;
/// Prompt window selection.
pub mod context;
/// Retry and failover decorator.
pub mod failover;
/// The completion gateway abstraction.
pub mod gateway;
/// The per-request coordinator.
pub mod orchestrator;

pub use config::{ChatConfig, LlmProvider, ModelConfig};
pub use context::ContextWindow;
pub use failover::{FailoverGateway, RetryPolicy};
pub use gateway::{build_gateway, CompletionGateway};
pub use orchestrator::{CyclePhase, ResponseOrchestrator};
