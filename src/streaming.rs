use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::CompletionError;

/// One decoded server-sent event from a streaming completion
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Text fragment from `choices[0].delta.content`
    Delta(String),
    /// `data: [DONE]`
    Done,
    /// Error object delivered mid-stream
    Error(CompletionError),
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Splits an SSE byte stream into lines and decodes the `data:` payloads.
///
/// Bytes are buffered until a newline arrives so multi-byte characters split
/// across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns events for every complete line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = decode_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn decode_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "skipping undecodable stream line");
            return None;
        }
    };

    if let Some(err) = CompletionError::from_stream_payload(&value) {
        return Some(SseEvent::Error(err));
    }

    let chunk: StreamChunk = serde_json::from_value(value).ok()?;
    let content = chunk
        .choices
        .into_iter()
        .next()?
        .delta?
        .content
        .filter(|c| !c.is_empty())?;
    Some(SseEvent::Delta(content))
}

/// Running buffer for a streamed reply
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// Accumulated text buffer
    text_buffer: String,
    /// Number of fragments seen so far
    chunks: usize,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a text delta from the LLM
    pub fn push_delta(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.text_buffer.push_str(delta);
        self.chunks += 1;
    }

    pub fn has_content(&self) -> bool {
        !self.text_buffer.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    /// Finalize and take the assembled reply
    pub fn finalize(self) -> String {
        debug!(chunks = self.chunks, len = self.text_buffer.len(), "stream finalized");
        self.text_buffer
    }
}
