//! Progress callbacks for per-page OCR events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] with
//! [`crate::config::OcrConfigBuilder::progress_callback`]. The CLI drives an
//! indicatif bar from it; the web UI leaves it unset.
//!
//! ```rust
//! use vlm_ocr::{OcrConfig, OcrProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl OcrProgressCallback for Counter {
//!     fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! assert!(config.progress_callback.is_some());
//! ```

use crate::output::DocumentInfo;
use std::sync::Arc;

/// Called by the pipeline as it works through a document.
///
/// Pages are processed one after another, so calls never overlap for a
/// single document. All methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// The document has been opened; `selected_pages` pages will be sent.
    fn on_document_start(&self, info: &DocumentInfo, selected_pages: usize) {
        let _ = (info, selected_pages);
    }

    /// Called just before the request for `page_num` is sent.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// `text_len` is the byte length of the returned text.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every selected page has been attempted.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Does nothing. Used when no callback is configured.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EventLog(Mutex<Vec<String>>);

    impl OcrProgressCallback for EventLog {
        fn on_document_start(&self, info: &DocumentInfo, selected_pages: usize) {
            self.0
                .lock()
                .unwrap()
                .push(format!("start {} {}", info.name, selected_pages));
        }

        fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("error {page_num} {error}"));
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 10);
        cb.on_document_complete(2, 2);
    }

    #[test]
    fn overridden_methods_receive_arguments() {
        let log = EventLog::default();
        let info = DocumentInfo {
            name: "a.pdf".into(),
            size_bytes: 10,
            page_count: 3,
        };
        log.on_document_start(&info, 2);
        log.on_page_start(1, 2);
        log.on_page_error(2, 2, "timeout");

        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["start a.pdf 2".to_string(), "error 2 timeout".to_string()]
        );
    }
}
