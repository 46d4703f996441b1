pub mod claude;
pub mod openai;

use colloquy_core::{CompletionError, Turn};

/// Largest attachment inlined verbatim into the prompt.
pub const MAX_INLINE_ATTACHMENT_BYTES: usize = 16 * 1024;

/// Renders a turn as provider message text.
///
/// Small UTF-8 attachments are inlined between markers; anything else is
/// summarised by name and size so attachment-only turns still produce a
/// non-empty prompt.
pub fn render_content(turn: &Turn) -> String {
    let mut out = turn.content().to_string();
    for att in turn.attachments() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        match std::str::from_utf8(&att.data) {
            Ok(text) if att.data.len() <= MAX_INLINE_ATTACHMENT_BYTES => {
                out.push_str(&format!(
                    "[attachment: {}]\n{}\n[end of attachment: {}]",
                    att.name, text, att.name
                ));
            }
            _ => {
                out.push_str(&format!("[attachment: {}, {} bytes]", att.name, att.len()));
            }
        }
    }
    out
}

/// Maps a `reqwest` send/read failure onto the completion taxonomy.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::timeout(format!("{provider} request timed out: {e}"))
    } else {
        CompletionError::transport(format!("{provider} request failed: {e}"))
    }
}
