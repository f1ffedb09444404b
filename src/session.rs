use tracing::debug;
use uuid::Uuid;

use crate::client::ResponseClient;
use crate::error::CompletionError;
use crate::store::ConversationStore;

/// What the front end tracks for one open conversation.
///
/// `&mut self` on every call means one request per session at a time;
/// `is_loading` is what a UI disables its input on.
#[derive(Debug, Clone)]
pub struct ChatSession {
    conversation_id: String,
    user_name: Option<String>,
    streaming: bool,
    is_loading: bool,
    last_error: Option<CompletionError>,
}

impl ChatSession {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_name: None,
            streaming: true,
            is_loading: false,
            last_error: None,
        }
    }

    /// Session with a freshly generated conversation id
    pub fn fresh() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_user_name(mut self, name: Option<String>) -> Self {
        self.user_name = name;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn set_user_name(&mut self, name: impl Into<String>) {
        self.user_name = Some(name.into());
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn toggle_streaming(&mut self) -> bool {
        self.streaming = !self.streaming;
        self.streaming
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&CompletionError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Send one message. Streamed fragments (or the whole blocking reply)
    /// go to `on_chunk`; the full reply text is returned.
    pub async fn on_send_message<F>(
        &mut self,
        client: &ResponseClient,
        store: &mut ConversationStore,
        text: &str,
        mut on_chunk: F,
    ) -> String
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }

        self.is_loading = true;
        self.last_error = None;

        let result = if self.streaming {
            client
                .try_complete_streaming(
                    store,
                    text,
                    &self.conversation_id,
                    &mut on_chunk,
                    self.user_name.as_deref(),
                )
                .await
        } else {
            client
                .try_complete(store, text, &self.conversation_id, self.user_name.as_deref())
                .await
                .inspect(|reply| on_chunk(reply.as_str()))
        };

        self.is_loading = false;
        match result {
            Ok(reply) => reply,
            Err(err) => {
                // streaming always apologises generically, blocking by category
                let apology = if self.streaming {
                    crate::error::GENERIC_APOLOGY
                } else {
                    err.apology()
                };
                on_chunk(apology);
                self.last_error = Some(err);
                apology.to_string()
            }
        }
    }

    pub fn on_clear_conversation(&mut self, store: &mut ConversationStore) {
        let existed = store.clear(&self.conversation_id);
        self.last_error = None;
        debug!(conversation = %self.conversation_id, existed, "conversation cleared by user");
    }
}
