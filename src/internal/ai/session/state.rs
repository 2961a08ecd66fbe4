//! Session state types.

use serde::{Deserialize, Serialize};

use crate::internal::ai::completion::Message;

/// Unique session identifier, assigned by [`SessionStore`](super::SessionStore).
pub type SessionId = u64;

/// Number of dialogue entries kept before a new user turn is appended.
pub const DIALOGUE_WINDOW: usize = 28;

/// System prompt used when a session is started without one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// The durable part of a session, stored as `context.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionContext {
    /// Prepended to every completion request; replaced as a whole.
    pub prompt: Vec<Message>,
    /// Target completion model id.
    pub model: String,
    /// User/assistant turns in the order they were appended.
    #[serde(default)]
    pub dialogue: Vec<Message>,
}

impl SessionContext {
    pub fn new(model: impl Into<String>, prompt: Vec<Message>, dialogue: Vec<Message>) -> Self {
        Self {
            prompt,
            model: model.into(),
            dialogue,
        }
    }

    pub fn default_prompt() -> Vec<Message> {
        vec![Message::system(DEFAULT_SYSTEM_PROMPT)]
    }

    /// Drop the oldest dialogue entries so at most `window` remain.
    pub fn truncate_dialogue(&mut self, window: usize) {
        if self.dialogue.len() > window {
            let excess = self.dialogue.len() - window;
            self.dialogue.drain(..excess);
        }
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.dialogue.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: &str) {
        self.dialogue.push(Message::assistant(content));
    }

    /// Remove the two consecutive entries starting at `index`.
    ///
    /// Alternation of the remaining dialogue is not re-checked. Nothing is
    /// removed unless both entries exist.
    pub fn remove_pair(&mut self, index: usize) -> Result<(), usize> {
        let len = self.dialogue.len();
        if index.checked_add(1).is_none_or(|second| second >= len) {
            return Err(len);
        }
        self.dialogue.drain(index..index + 2);
        Ok(())
    }

    pub fn clear_dialogue(&mut self) {
        self.dialogue.clear();
    }

    /// System prompt followed by dialogue, as sent to the completion model.
    pub fn completion_messages(&self) -> Vec<Message> {
        self.prompt
            .iter()
            .chain(self.dialogue.iter())
            .cloned()
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.dialogue.len()
    }
}

/// In-memory session: its id, durable context, and whether it has been exported.
#[derive(Debug)]
pub struct SessionState {
    pub id: SessionId,
    pub context: SessionContext,
    /// Set once the session has been archived and removed; waiters that
    /// acquire the lock afterwards must treat the session as gone.
    pub retired: bool,
}

impl SessionState {
    pub fn new(id: SessionId, context: SessionContext) -> Self {
        Self {
            id,
            context,
            retired: false,
        }
    }
}
