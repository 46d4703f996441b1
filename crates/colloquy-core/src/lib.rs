//! Core types and error definitions for Colloquy.
//!
//! This crate provides the value types shared by every other Colloquy crate:
//! the conversation model, validated session identifiers, and the unified
//! error enum.
//!
//! # Main types
//!
//! - [`ColloquyError`]: Unified error enum for all Colloquy subsystems.
//! - [`ColloquyResult`]: Convenience alias for `Result<T, ColloquyError>`.
//! - [`CompletionError`]: Categorised failure of an external completion call.
//! - [`Role`]: Author of a turn (user or assistant).
//! - [`Attachment`]: An opaque named blob attached to a turn.
//! - [`Turn`]: A single immutable message in a conversation.
//! - [`Transcript`]: The ordered history of turns for one session.
//! - [`SessionId`]: A validated, opaque session key.

/// Error types.
pub mod error;
/// Turn and attachment types.
pub mod message;
/// Validated session identifiers.
pub mod session_id;
/// Ordered transcripts.
pub mod transcript;

pub use error::{ColloquyError, ColloquyResult, CompletionError, CompletionErrorKind};
pub use message::{encode_base64, Attachment, Role, Turn};
pub use session_id::SessionId;
pub use transcript::Transcript;
