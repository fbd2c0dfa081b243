//! OpenAI adapter (chat completions, text and vision).
//!
//! Implements the core `CompletionClient` port over the `chat/completions`
//! endpoint. Upstream failures are returned as `CompletionReply::Failed`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use tib_core::{
    config::Config,
    errors::Error,
    model::{
        client::CompletionClient,
        types::{CompletionFailure, CompletionReply, CompletionRequest},
    },
    Result,
};

pub const MAX_COMPLETION_TOKENS: u32 = 10_000;
pub const REASONING_EFFORT: &str = "high";
pub const TEMPERATURE: u32 = 1;

/// Characters of an error body echoed back to the user.
const ERROR_EXCERPT_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub chat_url: String,
    pub timeout: Duration,
}

impl From<&Config> for OpenAiConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            api_key: cfg.openai_api_key.clone(),
            model: cfg.model.clone(),
            chat_url: cfg.chat_url.clone(),
            timeout: cfg.completion_timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    cfg: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("openai http client build failed: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn transport_failure(&self, e: reqwest::Error) -> CompletionReply {
        if e.is_timeout() {
            error!(timeout_secs = self.cfg.timeout.as_secs(), "openai request timed out");
            return CompletionReply::Failed(CompletionFailure::Timeout {
                secs: self.cfg.timeout.as_secs(),
            });
        }
        error!(error = %e, "openai request failed");
        CompletionReply::Failed(CompletionFailure::Transport(e.to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.cfg.model
    }

    async fn complete(&self, req: CompletionRequest) -> CompletionReply {
        let body = ChatRequest::from_request(&req);
        info!(
            model = %req.model,
            prompt_len = req.prompt.len(),
            image_len = req.image.as_ref().map(|i| i.bytes.len()).unwrap_or(0),
            "openai request"
        );

        let resp = match self
            .http
            .post(&self.cfg.chat_url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return self.transport_failure(e),
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => return self.transport_failure(e),
        };
        info!(status = status.as_u16(), len = text.len(), "openai response");

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %text, "openai error response");
            return CompletionReply::Failed(CompletionFailure::Status {
                status: status.as_u16(),
                excerpt: text.chars().take(ERROR_EXCERPT_CHARS).collect(),
            });
        }

        CompletionReply::Text(parse_completion_body(&text))
    }
}

// ============== Request body ==============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    reasoning_effort: &'static str,
    temperature: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

impl<'a> ChatRequest<'a> {
    fn from_request(req: &'a CompletionRequest) -> Self {
        let content = match &req.image {
            None => MessageContent::Text(&req.prompt),
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text { text: &req.prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_uri(&image.bytes),
                    },
                },
            ]),
        };
        Self {
            model: &req.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            reasoning_effort: REASONING_EFFORT,
            temperature: TEMPERATURE,
        }
    }
}

/// Media type sniffed from magic bytes. Unknown content is labelled PNG.
pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

pub fn image_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        detect_image_mime(bytes),
        STANDARD.encode(bytes)
    )
}

// ============== Response parsing ==============

/// Reply text from a successful response body.
///
/// Falls back to the raw JSON (or the raw body, if it is not JSON) when the
/// usual `choices[0].message.content` shape is missing.
pub fn parse_completion_body(body: &str) -> String {
    let v: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "openai response is not json; returning raw body");
            return body.to_string();
        }
    };

    match extract_reply_text(&v) {
        Some(text) => text,
        None => {
            warn!("unexpected openai response structure; returning raw json");
            v.to_string()
        }
    }
}

fn extract_reply_text(v: &serde_json::Value) -> Option<String> {
    let content = v
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    if let Some(s) = content.as_str() {
        return Some(s.to_string());
    }

    let parts = content.as_array()?;
    debug!(parts = parts.len(), "openai content is a part list");
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(_) if part.get("type").and_then(|t| t.as_str()) == Some("text") => {
                part.get("text").and_then(|t| t.as_str())
            }
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    Some(texts.join("\n"))
}
