use colloquy_core::{Role, Turn};

/// Chooses which part of a transcript is sent to the provider.
///
/// Only the prompt is trimmed; the stored transcript is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextWindow {
    max_turns: Option<usize>,
}

impl ContextWindow {
    /// `None` sends the whole transcript. A window always holds at least
    /// the newest turn.
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            max_turns: max_turns.map(|max| max.max(1)),
        }
    }

    /// Sends everything.
    pub fn unbounded() -> Self {
        Self { max_turns: None }
    }

    /// The trailing slice of `turns` that fits the window.
    ///
    /// The slice never starts with an assistant turn, since providers
    /// expect a conversation to open with the user. A transcript that fits
    /// is returned untouched.
    pub fn select<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        let Some(max) = self.max_turns else {
            return turns;
        };
        if turns.len() <= max {
            return turns;
        }
        let mut start = turns.len() - max;
        while start < turns.len() && turns[start].role() == Role::Assistant {
            start += 1;
        }
        &turns[start..]
    }

    /// Rough token estimation (4 chars ≈ 1 token).
    pub fn estimated_tokens(system_prompt: &str, turns: &[Turn]) -> usize {
        let msg_tokens: usize = turns.iter().map(|t| t.content().len() / 4).sum();
        system_prompt.len() / 4 + msg_tokens
    }
}
