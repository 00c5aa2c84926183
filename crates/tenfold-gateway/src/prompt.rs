//! Prompt context assembly.

use tenfold_core::chat::{ChatMessage, Role};

/// Everything a completion call needs: an optional system prompt, a
/// bounded window of prior transcript, and the current user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub system: Option<String>,
    pub history: Vec<ChatMessage>,
    pub user: String,
}

impl PromptContext {
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            history: Vec::new(),
            user: user.into(),
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Flattens into the wire message list: system first, then history,
    /// then the user message.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.user.clone()));
        messages
    }

    fn estimated_len(&self) -> usize {
        self.system.as_deref().map_or(0, str::len)
            + self
                .history
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>()
            + self.user.len()
    }

    /// Drops the oldest non-system history entries until the estimated
    /// context size fits the budget. System entries are always kept.
    pub fn trim_to(&mut self, budget_chars: usize) {
        while self.estimated_len() > budget_chars {
            let Some(idx) = self.history.iter().position(|m| m.role != Role::System) else {
                break;
            };
            self.history.remove(idx);
        }
    }
}
