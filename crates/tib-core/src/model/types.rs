use std::fmt;

/// Inline image bytes sent alongside a prompt.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
}

// Keep multi-megabyte payloads out of debug logs.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One completion call. Built per request, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub image: Option<ImagePayload>,
}

/// Why an upstream call produced no completion text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionFailure {
    /// Non-success HTTP status; `excerpt` is the start of the response body.
    Status { status: u16, excerpt: String },
    /// The request did not finish within the configured timeout.
    Timeout { secs: u64 },
    /// Connection, TLS or other transport-level failure.
    Transport(String),
}

impl fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionFailure::Status { status, excerpt } => {
                write!(f, "OpenAI returned an error: {status}. Response: {excerpt}")
            }
            CompletionFailure::Timeout { secs } => {
                write!(f, "OpenAI request timed out ({secs} seconds).")
            }
            CompletionFailure::Transport(msg) => write!(f, "OpenAI request failed: {msg}"),
        }
    }
}

/// Outcome of a completion call. Failures are values, not errors: they are
/// delivered to the caller as reply text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionReply {
    Text(String),
    Failed(CompletionFailure),
}

impl CompletionReply {
    pub fn is_text(&self) -> bool {
        matches!(self, CompletionReply::Text(_))
    }

    /// Text shown to the user.
    pub fn into_reply_text(self) -> String {
        match self {
            CompletionReply::Text(t) if t.trim().is_empty() => {
                "(empty response from the model)".to_string()
            }
            CompletionReply::Text(t) => t,
            CompletionReply::Failed(f) => f.to_string(),
        }
    }
}
