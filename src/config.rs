//! Configuration types for document OCR.
//!
//! Every knob lives in [`OcrConfig`], built via its [`OcrConfigBuilder`].
//! The defaults reproduce the reference deployment: a vLLM server named
//! `qwen-vlm` serving `Qwen/Qwen2.5-VL-3B-Instruct-AWQ`, pages rendered at
//! 150 DPI, deterministic sampling.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Base URL of the inference server inside the compose network.
pub const DEFAULT_ENDPOINT: &str = "http://qwen-vlm:8000/v1";

/// Model served by the reference deployment.
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-VL-3B-Instruct-AWQ";

/// Instruction sent alongside every page image.
pub const DEFAULT_PROMPT: &str = "Please extract all text from this image.";

/// Configuration for an OCR run.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use vlm_ocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .endpoint("http://localhost:8000/v1")
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Base URL of the OpenAI-compatible API, without `/chat/completions`.
    pub endpoint: String,

    /// Model identifier sent in every request.
    pub model: String,

    /// Optional bearer token. vLLM accepts any value unless started with `--api-key`.
    pub api_key: Option<String>,

    /// Instruction text placed before the image in the user message.
    pub prompt: String,

    /// Rendering resolution. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    ///
    /// Keeps poster-sized pages from producing images the server rejects.
    pub max_rendered_pixels: u32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: u32,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Per-request timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit pdfium library path. Falls back to `PDFIUM_LIB_PATH`,
    /// the working directory, then the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Separator placed between pages in the downloadable text.
    pub page_separator: PageSeparator,

    /// What to do when a single page fails.
    pub failure_policy: FailurePolicy,

    /// Keep each page's encoded PNG in the session so a UI can display it.
    pub retain_page_images: bool,

    /// Per-page progress events. `None` means no callbacks.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            prompt: DEFAULT_PROMPT.to_string(),
            dpi: 150,
            max_rendered_pixels: 4000,
            max_tokens: 4096,
            temperature: 0.0,
            request_timeout_secs: 60,
            download_timeout_secs: 120,
            password: None,
            pdfium_lib_path: None,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            failure_policy: FailurePolicy::default(),
            retain_page_images: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("prompt", &self.prompt)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("failure_policy", &self.failure_policy)
            .field("retain_page_images", &self.retain_page_images)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    /// Out-of-range values are rejected by [`build`](Self::build).
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn retain_page_images(mut self, v: bool) -> Self {
        self.config.retain_page_images = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        let endpoint = c.endpoint.trim();
        if endpoint.is_empty() {
            return Err(OcrError::InvalidConfig("endpoint must not be empty".into()));
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(OcrError::InvalidConfig(format!(
                "endpoint must be an http:// or https:// URL, got '{endpoint}'"
            )));
        }
        if c.model.trim().is_empty() {
            return Err(OcrError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be at least 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Behaviour when one page fails to render or to come back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure against the page and continue with the next one.
    #[default]
    BestEffort,
    /// Abort the whole document on the first failed page.
    FailFast,
}

/// Specifies which pages of the PDF to OCR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// How pages are joined in the downloadable text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// A single line break: `"Hello\nWorld"`. (default)
    #[default]
    Newline,
    /// One blank line between pages.
    BlankLine,
    /// A Markdown horizontal rule on its own paragraph.
    HorizontalRule,
    /// A custom line placed between pages.
    Custom(String),
}

impl PageSeparator {
    /// The string inserted between two consecutive page texts.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            PageSeparator::Newline => "\n".into(),
            PageSeparator::BlankLine => "\n\n".into(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".into(),
            PageSeparator::Custom(s) => format!("\n{s}\n").into(),
        }
    }

    /// Join page texts with this separator.
    pub fn join<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> String {
        let sep = self.as_str();
        let mut out = String::new();
        for (i, text) in texts.into_iter().enumerate() {
            if i > 0 {
                out.push_str(&sep);
            }
            out.push_str(text);
        }
        out
    }
}
