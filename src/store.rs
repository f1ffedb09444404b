use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, info};

use crate::memory::{ContextUpdate, ConversationContext, ConversationMemory};
use crate::message::{ChatMessage, LlmMessage};
use crate::prompts::DEFAULT_SYSTEM_INSTRUCTIONS;

/// Number of messages sent with each request unless configured otherwise
pub const DEFAULT_WINDOW: usize = 20;

/// Settings for a [`ConversationStore`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Seeded as the first message of every new conversation
    pub system_instructions: String,
    /// Least-recently-used conversations are evicted past this many; `None` is unbounded
    pub max_conversations: Option<NonZeroUsize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            max_conversations: None,
        }
    }
}

/// In-memory conversation logs keyed by conversation id.
///
/// Constructed explicitly and handed to consumers by reference; nothing here
/// is process-wide. Logs grow until the conversation is cleared or evicted.
pub struct ConversationStore {
    system_instructions: String,
    conversations: LruCache<String, ConversationMemory>,
}

impl ConversationStore {
    pub fn new(config: StoreConfig) -> Self {
        let conversations = match config.max_conversations {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            system_instructions: config.system_instructions,
            conversations,
        }
    }

    /// Fetch a conversation, creating it with only the system message if absent
    pub fn get_or_create(&mut self, id: &str) -> &mut ConversationMemory {
        if !self.conversations.contains(id) {
            if self.conversations.len() == self.conversations.cap().get() {
                if let Some((evicted, _)) = self.conversations.peek_lru() {
                    info!(conversation = %evicted, "evicting least recently used conversation");
                }
            }
            debug!(conversation = %id, "creating conversation");
        }

        let instructions = &self.system_instructions;
        self.conversations
            .get_or_insert_mut(id.to_string(), || ConversationMemory::new(instructions))
    }

    pub fn append(&mut self, id: &str, message: ChatMessage) {
        let memory = self.get_or_create(id);
        memory.push(message);
        debug!(conversation = %id, len = memory.messages().len(), "appended message");
    }

    /// Messages for the next outbound request; storage is left untouched
    pub fn trim_for_request(&self, id: &str, window: usize) -> Vec<LlmMessage> {
        self.conversations
            .peek(id)
            .map(|memory| memory.trimmed(window))
            .unwrap_or_default()
    }

    /// Drop a conversation entirely. Returns whether it existed.
    pub fn clear(&mut self, id: &str) -> bool {
        let existed = self.conversations.pop(id).is_some();
        if existed {
            debug!(conversation = %id, "cleared conversation");
        }
        existed
    }

    /// Merge into the context of an existing conversation
    pub fn set_context(&mut self, id: &str, update: ContextUpdate) -> bool {
        match self.conversations.get_mut(id) {
            Some(memory) => {
                memory.context.merge(update);
                true
            }
            None => false,
        }
    }

    pub fn update_system_instructions(&mut self, id: &str, instructions: &str) -> bool {
        match self.conversations.get_mut(id) {
            Some(memory) => {
                memory.set_system_instructions(instructions);
                true
            }
            None => false,
        }
    }

    /// Full untrimmed log without the system message
    pub fn history(&self, id: &str) -> Vec<ChatMessage> {
        self.conversations
            .peek(id)
            .map(|memory| memory.history().to_vec())
            .unwrap_or_default()
    }

    pub fn context(&self, id: &str) -> Option<&ConversationContext> {
        self.conversations.peek(id).map(|memory| &memory.context)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains(id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
