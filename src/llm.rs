use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{CompletionError, CompletionResult};
use crate::message::LlmMessage;
use crate::streaming::{SseDecoder, SseEvent};

/// Events emitted during LLM streaming
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Text delta from streaming response
    TextDelta(String),
    /// Stream completed
    StreamComplete,
    /// Error occurred; nothing follows
    Error(CompletionError),
}

/// Request to send to LLM
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Outbound side of a completion. Implementations turn provider failures
/// into tagged [`CompletionError`]s.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// One blocking call. `Ok(None)` means the provider answered without text.
    async fn complete(&self, request: LlmRequest) -> CompletionResult<Option<String>>;

    /// Start a streamed call; events arrive on the returned channel and the
    /// channel ends after `StreamComplete` or `Error`.
    async fn stream(&self, request: LlmRequest) -> CompletionResult<mpsc::Receiver<LlmEvent>>;
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Transport for OpenAI-compatible `/chat/completions` endpoints
#[derive(Clone)]
pub struct OpenAiTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Bounds connecting, and the whole exchange for blocking calls
    timeout: Duration,
}

impl OpenAiTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        // No client-wide timeout: it would cut long streamed replies short
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No API key configured"))?;
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// `deadline` bounds the request including the body read; streams pass `None`.
    async fn send(
        &self,
        request: &LlmRequest,
        deadline: Option<Duration>,
    ) -> CompletionResult<reqwest::Response> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "sending completion request"
        );

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request);
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "completion request failed");
                CompletionError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let err = CompletionError::from_response(status, &error_text);
            error!(status = status.as_u16(), error = %err, "completion API error");
            return Err(err);
        }

        Ok(response)
    }

    /// Drain an SSE body into the channel
    async fn process_sse_stream(response: reqwest::Response, tx: mpsc::Sender<LlmEvent>) {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let events = match chunk {
                Ok(bytes) => decoder.push(&bytes),
                Err(e) => {
                    warn!(error = %e, "stream interrupted");
                    let _ = tx.send(LlmEvent::Error(CompletionError::from(e))).await;
                    return;
                }
            };
            if Self::forward(events, &tx).await {
                return;
            }
        }

        if !Self::forward(decoder.finish(), &tx).await {
            let _ = tx.send(LlmEvent::StreamComplete).await;
        }
    }

    /// Returns true once a terminal event has been sent
    async fn forward(events: Vec<SseEvent>, tx: &mpsc::Sender<LlmEvent>) -> bool {
        for event in events {
            match event {
                SseEvent::Delta(text) => {
                    let _ = tx.send(LlmEvent::TextDelta(text)).await;
                }
                SseEvent::Done => {
                    let _ = tx.send(LlmEvent::StreamComplete).await;
                    return true;
                }
                SseEvent::Error(err) => {
                    warn!(error = %err, "provider reported an error mid-stream");
                    let _ = tx.send(LlmEvent::Error(err)).await;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl LlmTransport for OpenAiTransport {
    async fn complete(&self, mut request: LlmRequest) -> CompletionResult<Option<String>> {
        request.stream = false;
        let response = self.send(&request, Some(self.timeout)).await?;

        let body: CompletionBody = response.json().await.map_err(|e| {
            error!(error = %e, "unreadable completion body");
            CompletionError::Unknown(format!("unreadable completion body: {e}"))
        })?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty()))
    }

    async fn stream(&self, mut request: LlmRequest) -> CompletionResult<mpsc::Receiver<LlmEvent>> {
        request.stream = true;
        let response = self.send(&request, None).await?;

        let (tx, rx) = mpsc::channel(1000);
        tokio::spawn(Self::process_sse_stream(response, tx));
        Ok(rx)
    }
}
