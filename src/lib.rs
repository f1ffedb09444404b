//! Conversation memory and a streaming response client for
//! OpenAI-compatible chat-completion APIs.

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod prompts;
pub mod session;
pub mod store;
pub mod streaming;

pub use client::{RequestSettings, ResponseClient};
pub use config::Config;
pub use error::{CompletionError, CompletionResult};
pub use llm::{LlmEvent, LlmRequest, LlmTransport, OpenAiTransport};
pub use memory::{ContextUpdate, ConversationContext, ConversationMemory};
pub use message::{ChatMessage, LlmMessage, Role};
pub use session::ChatSession;
pub use store::{ConversationStore, StoreConfig, DEFAULT_WINDOW};
