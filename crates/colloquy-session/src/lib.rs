//! Session registry for Colloquy.
//!
//! [`SessionStore`] is the sole owner of every transcript. Each session has
//! its own transcript lock and its own exclusion slot, so work on distinct
//! sessions never contends on a shared lock for longer than a map lookup.
//! An optional [`TranscriptJournal`] makes appends write-through to disk.

pub mod journal;
pub mod session;
pub mod store;

pub use journal::{FileTranscriptJournal, TranscriptJournal};
pub use session::{SessionSlot, TranscriptHandle};
pub use store::SessionStore;
