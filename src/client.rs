use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{CompletionError, CompletionResult, GENERIC_APOLOGY};
use crate::llm::{LlmEvent, LlmRequest, LlmTransport};
use crate::memory::ContextUpdate;
use crate::message::ChatMessage;
use crate::prompts::EMPTY_COMPLETION_FALLBACK;
use crate::store::{ConversationStore, DEFAULT_WINDOW};
use crate::streaming::StreamState;

/// Per-request parameters sent with every completion
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Messages per request, system instruction included
    pub window: usize,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Runs one conversational turn against the model: records the user
/// message, sends the trimmed log, records the reply.
#[derive(Clone)]
pub struct ResponseClient {
    transport: Arc<dyn LlmTransport>,
    settings: RequestSettings,
}

impl ResponseClient {
    pub fn new(transport: Arc<dyn LlmTransport>, settings: RequestSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Blocking turn. Failures come back as the canned apology for their
    /// category and are not recorded in the conversation.
    pub async fn complete(
        &self,
        store: &mut ConversationStore,
        message: &str,
        conversation_id: &str,
        user_name: Option<&str>,
    ) -> String {
        match self
            .try_complete(store, message, conversation_id, user_name)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                error!(conversation = %conversation_id, error = %err, "completion failed");
                err.apology().to_string()
            }
        }
    }

    /// Blocking turn with the failure returned to the caller
    pub async fn try_complete(
        &self,
        store: &mut ConversationStore,
        message: &str,
        conversation_id: &str,
        user_name: Option<&str>,
    ) -> CompletionResult<String> {
        let request = self.begin_turn(store, message, conversation_id, user_name, false);

        let reply = self
            .transport
            .complete(request)
            .await?
            .unwrap_or_else(|| EMPTY_COMPLETION_FALLBACK.to_string());

        store.append(conversation_id, ChatMessage::assistant(reply.clone()));
        info!(conversation = %conversation_id, len = reply.len(), "completion recorded");
        Ok(reply)
    }

    /// Streamed turn. Each fragment goes to `on_chunk` as it arrives; the
    /// assembled reply is recorded once the stream ends. On failure a single
    /// apology chunk is sent and nothing is recorded.
    pub async fn complete_streaming<F>(
        &self,
        store: &mut ConversationStore,
        message: &str,
        conversation_id: &str,
        mut on_chunk: F,
        user_name: Option<&str>,
    ) where
        F: FnMut(&str),
    {
        if let Err(err) = self
            .try_complete_streaming(store, message, conversation_id, &mut on_chunk, user_name)
            .await
        {
            error!(conversation = %conversation_id, error = %err, "streaming completion failed");
            on_chunk(GENERIC_APOLOGY);
        }
    }

    /// Streamed turn returning the assembled reply or the failure
    pub async fn try_complete_streaming<F>(
        &self,
        store: &mut ConversationStore,
        message: &str,
        conversation_id: &str,
        mut on_chunk: F,
        user_name: Option<&str>,
    ) -> CompletionResult<String>
    where
        F: FnMut(&str),
    {
        let request = self.begin_turn(store, message, conversation_id, user_name, true);
        let mut rx = self.transport.stream(request).await?;
        let mut state = StreamState::new();

        loop {
            match rx.recv().await {
                Some(LlmEvent::TextDelta(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    state.push_delta(&delta);
                    on_chunk(&delta);
                }
                Some(LlmEvent::StreamComplete) => break,
                Some(LlmEvent::Error(err)) => return Err(err),
                None => {
                    // sender dropped without a terminal event
                    if !state.has_content() {
                        return Err(CompletionError::Unknown(
                            "stream closed before any content arrived".to_string(),
                        ));
                    }
                    break;
                }
            }
        }

        let reply = state.finalize();
        store.append(conversation_id, ChatMessage::assistant(reply.clone()));
        info!(conversation = %conversation_id, len = reply.len(), "streamed completion recorded");
        Ok(reply)
    }

    /// Record the user message and build the outbound request
    fn begin_turn(
        &self,
        store: &mut ConversationStore,
        message: &str,
        conversation_id: &str,
        user_name: Option<&str>,
        stream: bool,
    ) -> LlmRequest {
        let memory = store.get_or_create(conversation_id);
        if let Some(name) = user_name {
            if memory.context.user_name.is_none() {
                memory.context.merge(ContextUpdate::user_name(name));
            }
        }
        store.append(conversation_id, ChatMessage::user(message));

        let messages = store.trim_for_request(conversation_id, self.settings.window);
        debug!(
            conversation = %conversation_id,
            sent = messages.len(),
            stream,
            "prepared request"
        );

        LlmRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream,
        }
    }
}
