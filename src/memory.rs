use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::{ChatMessage, LlmMessage, Role};

/// Facts about the person on the other side of a conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_name: Option<String>,
    pub preferences: Option<Map<String, Value>>,
    pub summary: Option<String>,
}

/// Partial context; `Some` fields replace the stored ones, `None` leaves them alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub user_name: Option<String>,
    pub preferences: Option<Map<String, Value>>,
    pub summary: Option<String>,
}

impl ContextUpdate {
    pub fn user_name(name: impl Into<String>) -> Self {
        Self {
            user_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }
}

impl ConversationContext {
    /// Shallow merge: preferences are replaced wholesale, not key by key.
    pub fn merge(&mut self, update: ContextUpdate) {
        if let Some(name) = update.user_name {
            self.user_name = Some(name);
        }
        if let Some(preferences) = update.preferences {
            self.preferences = Some(preferences);
        }
        if let Some(summary) = update.summary {
            self.summary = Some(summary);
        }
    }
}

/// Message log and context for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
    pub context: ConversationContext,
}

impl ConversationMemory {
    /// New memory holding only the system instruction
    pub fn new(system_instructions: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_instructions)],
            context: ConversationContext::default(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn system_instructions(&self) -> &str {
        &self.messages[0].content
    }

    pub fn set_system_instructions(&mut self, instructions: impl Into<String>) {
        self.messages[0] = ChatMessage::system(instructions);
    }

    /// Everything after the system instruction
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages[1..]
    }

    /// The system instruction followed by the most recent `window - 1`
    /// messages, oldest first. Never mutates the log.
    pub fn trimmed(&self, window: usize) -> Vec<LlmMessage> {
        if window == 0 {
            return Vec::new();
        }

        let history = self.history();
        let keep = history.len().min(window - 1);
        let mut out = Vec::with_capacity(keep + 1);
        out.push(self.messages[0].to_llm());
        out.extend(history[history.len() - keep..].iter().map(ChatMessage::to_llm));

        debug_assert!(out.len() <= window);
        debug_assert_eq!(out[0].role, Role::System);
        out
    }
}
