use reqwest::StatusCode;
use serde::Deserialize;

/// Failure of a single completion call, classified by the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("completion failed: {0}")]
    Unknown(String),
}

pub type CompletionResult<T> = std::result::Result<T, CompletionError>;

const AUTH_APOLOGY: &str = "I apologize, but there seems to be an issue with the API configuration. Please check that the OpenAI API key is properly set.";
const RATE_LIMIT_APOLOGY: &str =
    "I apologize, but I'm currently experiencing high demand. Please try again in a moment.";
const QUOTA_APOLOGY: &str =
    "I apologize, but the API quota has been exceeded. Please try again later.";
/// Also the only text the streaming path ever pushes on failure.
pub const GENERIC_APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    fn mentions_quota(&self) -> bool {
        let code = self.code.as_ref().and_then(|c| c.as_str());
        [code, self.kind.as_deref()]
            .into_iter()
            .flatten()
            .any(|tag| tag == "insufficient_quota")
            || self
                .message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains("quota"))
    }
}

impl CompletionError {
    /// Classify free-form failure text by substring, ignoring case ("API key",
    /// "rate limit", "quota"). Used when the transport has nothing more
    /// structured to go on, e.g. connection errors or in-stream payloads.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        if lowered.contains("api key") {
            CompletionError::Auth(message)
        } else if lowered.contains("rate limit") {
            CompletionError::RateLimited(message)
        } else if lowered.contains("quota") {
            CompletionError::QuotaExceeded(message)
        } else {
            CompletionError::Unknown(message)
        }
    }

    /// Classify a non-success HTTP response from the provider
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()));

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Auth(message),
            StatusCode::PAYMENT_REQUIRED => CompletionError::QuotaExceeded(message),
            StatusCode::TOO_MANY_REQUESTS => {
                if parsed.as_ref().is_some_and(ErrorBody::mentions_quota) {
                    CompletionError::QuotaExceeded(message)
                } else {
                    CompletionError::RateLimited(message)
                }
            }
            _ => CompletionError::from_message(message),
        }
    }

    /// Classify an error object delivered inside an SSE data line
    pub(crate) fn from_stream_payload(value: &serde_json::Value) -> Option<Self> {
        let error = value.get("error")?;
        let message = match error {
            serde_json::Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| other.to_string()),
        };
        Some(CompletionError::from_message(message))
    }

    /// Text shown to the user in place of a reply
    pub fn apology(&self) -> &'static str {
        match self {
            CompletionError::Auth(_) => AUTH_APOLOGY,
            CompletionError::RateLimited(_) => RATE_LIMIT_APOLOGY,
            CompletionError::QuotaExceeded(_) => QUOTA_APOLOGY,
            CompletionError::Unknown(_) => GENERIC_APOLOGY,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CompletionError::Unknown(format!("request timed out: {err}"));
        }
        CompletionError::from_message(err.to_string())
    }
}
