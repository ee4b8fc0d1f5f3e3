//! # vlm-ocr
//!
//! OCR PDF documents by sending each rendered page to a vision-language model
//! behind an OpenAI-compatible chat-completions endpoint, such as vLLM serving
//! `Qwen/Qwen2.5-VL-3B-Instruct-AWQ`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    local file, URL, or bytes already in memory
//!  ├─ 2. Render   one page at a time via pdfium (spawn_blocking)
//!  ├─ 3. Encode   PNG → base64 data URI
//!  ├─ 4. Infer    one chat-completion request per page, sequentially
//!  └─ 5. Collect  SessionAggregator: ordered text, Markdown report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vlm_ocr::{ocr, ChatCompletionsClient, OcrConfig, PageSeparator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .endpoint("http://localhost:8000/v1")
//!         .build()?;
//!     let client = ChatCompletionsClient::new(&config)?;
//!     let session = ocr("document.pdf", &config, &client).await?;
//!     println!("{}", session.text(&PageSeparator::Newline));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `vlm-ocr` binary (clap, anyhow, tracing-subscriber, indicatif) |
//! | `server` | on      | The upload web UI (axum, askama) |
//!
//! Library-only use:
//! ```toml
//! vlm-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FailurePolicy, OcrConfig, OcrConfigBuilder, PageSelection, PageSeparator};
pub use error::{ErrorKind, InferenceError, OcrError, PageError};
pub use extract::{inspect, ocr, ocr_bytes, ocr_document, ocr_page, ocr_to_file};
pub use output::{Document, DocumentInfo, OcrResult, OcrStats};
pub use pipeline::client::{ChatCompletionsClient, InferenceClient};
pub use pipeline::encode::EncodedPage;
pub use pipeline::render::{PageImage, Rasterizer};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use session::{combined_text, PageEntry, SessionAggregator, SessionError, SessionState};
pub use stream::{ocr_stream, OcrStream};
