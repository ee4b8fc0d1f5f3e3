//! Error types for the vlm-ocr library.
//!
//! Three error types reflect three levels of failure:
//!
//! * [`OcrError`] **Fatal**: the document cannot be processed at all
//!   (missing file, not a PDF, pdfium unavailable) or the caller asked to
//!   abort on the first failed page.
//!
//! * [`PageError`] **Non-fatal**: one page failed. Stored in the
//!   [`crate::session::PageEntry`] for that page so the UI can show it.
//!
//! * [`InferenceError`]: what an [`crate::pipeline::client::InferenceClient`]
//!   returns. It carries no page number; the pipeline attaches one when it
//!   turns the failure into a [`PageError`].
//!
//! All three map onto the same coarse [`ErrorKind`].

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification shared by every error type in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The upload is not a parseable document.
    DocumentFormat,
    /// Connection failure or timeout talking to the inference endpoint.
    Network,
    /// The endpoint answered, but not with a usable completion.
    ResponseFormat,
    /// Anything else: configuration, I/O, internal.
    Other,
}

/// All fatal errors returned by the vlm-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a file path nor a URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document format errors ────────────────────────────────────────────
    /// The bytes do not start with the `%PDF` signature.
    #[error("'{name}' is not a PDF document (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("PDF '{name}' could not be parsed: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// The page selection matched no page of the document.
    #[error("Page selection matches no page (document has {total} pages)")]
    PageOutOfRange { total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Page errors escalated by policy ───────────────────────────────────
    /// A page failed under [`crate::config::FailurePolicy::FailFast`].
    #[error("OCR aborted on page {page}: {source}")]
    PageFailed {
        page: usize,
        #[source]
        source: PageError,
    },

    /// Every selected page failed; there is no text to return.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrError::NotAPdf { .. }
            | OcrError::CorruptPdf { .. }
            | OcrError::PasswordRequired { .. }
            | OcrError::WrongPassword { .. } => ErrorKind::DocumentFormat,
            OcrError::DownloadFailed { .. } | OcrError::DownloadTimeout { .. } => {
                ErrorKind::Network
            }
            OcrError::PageFailed { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// pdfium failed to rasterise the page.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered bitmap could not be PNG-encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The inference endpoint could not be reached.
    #[error("Page {page}: network error: {detail}")]
    Network { page: usize, detail: String },

    /// The request did not complete in time.
    #[error("Page {page}: request timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The endpoint answered with a non-success status.
    #[error("Page {page}: endpoint returned HTTP {status}: {body}")]
    HttpStatus { page: usize, status: u16, body: String },

    /// The response body lacked the completion text.
    #[error("Page {page}: malformed response: {detail}")]
    ResponseFormat { page: usize, detail: String },
}

impl PageError {
    /// Attach a page number to a client failure.
    pub fn from_inference(page: usize, err: InferenceError) -> Self {
        match err {
            InferenceError::Network { detail } => PageError::Network { page, detail },
            InferenceError::Timeout { secs } => PageError::Timeout { page, secs },
            InferenceError::Status { status, body } => PageError::HttpStatus { page, status, body },
            InferenceError::ResponseFormat { detail } => PageError::ResponseFormat { page, detail },
        }
    }

    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::Network { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::HttpStatus { page, .. }
            | PageError::ResponseFormat { page, .. } => *page,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PageError::RenderFailed { .. } | PageError::EncodeFailed { .. } => {
                ErrorKind::DocumentFormat
            }
            PageError::Network { .. } | PageError::Timeout { .. } => ErrorKind::Network,
            PageError::HttpStatus { .. } | PageError::ResponseFormat { .. } => {
                ErrorKind::ResponseFormat
            }
        }
    }
}

/// Failure of a single inference call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// Connection refused, DNS failure, reset, TLS error…
    #[error("request failed: {detail}")]
    Network { detail: String },

    /// No response within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx, but the body is not a chat completion with text content.
    #[error("unexpected response: {detail}")]
    ResponseFormat { detail: String },
}

impl InferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::Network { .. } | InferenceError::Timeout { .. } => ErrorKind::Network,
            InferenceError::Status { .. } | InferenceError::ResponseFormat { .. } => {
                ErrorKind::ResponseFormat
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_is_document_format() {
        let e = OcrError::NotAPdf {
            name: "notes.txt".into(),
            magic: b"hell".to_vec(),
        };
        assert_eq!(e.kind(), ErrorKind::DocumentFormat);
        assert!(e.to_string().contains("notes.txt"));
    }

    #[test]
    fn inference_error_gains_page_number() {
        let e = PageError::from_inference(
            2,
            InferenceError::Network {
                detail: "connection refused".into(),
            },
        );
        assert_eq!(e.page(), 2);
        assert_eq!(e.kind(), ErrorKind::Network);
        assert!(e.to_string().contains("Page 2"), "got: {e}");
    }

    #[test]
    fn status_maps_to_response_format_kind() {
        let e = PageError::from_inference(
            1,
            InferenceError::Status {
                status: 500,
                body: "boom".into(),
            },
        );
        assert_eq!(e.kind(), ErrorKind::ResponseFormat);
        assert!(e.to_string().contains("HTTP 500"));
    }

    #[test]
    fn page_failed_inherits_kind_of_source() {
        let e = OcrError::PageFailed {
            page: 3,
            source: PageError::Timeout { page: 3, secs: 60 },
        };
        assert_eq!(e.kind(), ErrorKind::Network);
        assert!(e.to_string().contains("page 3"));
    }

    #[test]
    fn all_pages_failed_display() {
        let e = OcrError::AllPagesFailed {
            total: 4,
            first_error: "Page 1: network error: refused".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 pages"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Other);
    }
}
