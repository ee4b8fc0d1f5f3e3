//! Inference client: one page image in, one completion string out.
//!
//! [`ChatCompletionsClient`] speaks the OpenAI chat-completions dialect that
//! vLLM exposes. Each page becomes one user message with two content parts,
//! the instruction text followed by the page as a `data:` URI:
//!
//! ```json
//! { "model": "Qwen/Qwen2.5-VL-3B-Instruct-AWQ",
//!   "messages": [{ "role": "user", "content": [
//!       { "type": "text", "text": "Please extract all text from this image." },
//!       { "type": "image_url", "image_url": { "url": "data:image/png;base64,…" } } ] }],
//!   "max_tokens": 4096,
//!   "temperature": 0.0 }
//! ```
//!
//! There is no retry: a failed call is returned to the caller as-is, and the
//! pipeline's [`crate::config::FailurePolicy`] decides what happens next.

use crate::config::OcrConfig;
use crate::error::{InferenceError, OcrError};
use crate::pipeline::encode::EncodedPage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Anything that can turn a page image into text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Extract the text of one page. The returned string is used verbatim.
    async fn extract_text(&self, page: &EncodedPage) -> Result<String, InferenceError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a completion body.
pub fn parse_completion(body: &str) -> Result<String, InferenceError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::ResponseFormat {
            detail: format!("body is not a chat completion: {e}"),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| InferenceError::ResponseFormat {
            detail: "missing choices[0].message.content".into(),
        })
}

// ── HTTP client ──────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    url: String,
    model: String,
    prompt: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ChatCompletionsClient {
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OcrError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.completions_url(),
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request body sent for `page`.
    pub fn build_request<'a>(&'a self, page: &EncodedPage) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: &self.prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: page.data_uri(),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            return InferenceError::Timeout {
                secs: self.timeout_secs,
            };
        }
        let mut detail = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        InferenceError::Network { detail }
    }
}

#[async_trait]
impl InferenceClient for ChatCompletionsClient {
    async fn extract_text(&self, page: &EncodedPage) -> Result<String, InferenceError> {
        let body = self.build_request(page);

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = parse_completion(&text)?;
        debug!(
            "Page {}: {} chars of completion text",
            page.page_num,
            content.len()
        );
        Ok(content)
    }
}
