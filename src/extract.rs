//! Eager (whole-document) OCR entry points.
//!
//! Every function here waits until each selected page has been attempted and
//! hands back a completed [`SessionAggregator`]. Use
//! [`crate::stream::ocr_stream`] to receive pages as they finish instead.
//!
//! Pages are processed strictly one after another: render, encode, one
//! request, record, next page.

use crate::config::{FailurePolicy, OcrConfig};
use crate::error::{OcrError, PageError};
use crate::output::{Document, DocumentInfo, OcrResult, OcrStats};
use crate::pipeline::client::InferenceClient;
use crate::pipeline::encode::encode_page;
use crate::pipeline::input;
use crate::pipeline::render::{self, PageImage, RenderOptions};
use crate::progress::{NoopProgressCallback, OcrProgressCallback};
use crate::session::{PageEntry, SessionAggregator};
use futures::{Stream, StreamExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// OCR a PDF file or URL.
///
/// # Errors
/// Fatal errors only: unreadable input, a document pdfium cannot open, a
/// failed page under [`FailurePolicy::FailFast`], or every page failing.
/// Under the default [`FailurePolicy::BestEffort`] individual page failures
/// are recorded in the returned aggregator.
pub async fn ocr(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
    client: &dyn InferenceClient,
) -> Result<SessionAggregator, OcrError> {
    let input_str = input_str.as_ref();
    info!("Starting OCR: {}", input_str);
    let document = input::resolve_input(input_str, config.download_timeout_secs).await?;
    ocr_document(document, config, client).await
}

/// OCR a PDF already held in memory.
pub async fn ocr_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &OcrConfig,
    client: &dyn InferenceClient,
) -> Result<SessionAggregator, OcrError> {
    let document = Document::new(name, bytes);
    input::validate_pdf(&document.name, &document.bytes)?;
    ocr_document(document, config, client).await
}

/// OCR a [`Document`].
pub async fn ocr_document(
    document: Document,
    config: &OcrConfig,
    client: &dyn InferenceClient,
) -> Result<SessionAggregator, OcrError> {
    let feed = render::spawn_rasterizer(document, RenderOptions::from_config(config)).await?;
    let info = feed.info.clone();
    let selected = feed.selected;
    process_pages(feed.into_stream(), info, selected, config, client).await
}

/// OCR a PDF and write the joined page text to `output_path`.
///
/// The text goes to a sibling temp file first and is renamed into place, so a
/// reader never sees a half-written file.
pub async fn ocr_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &OcrConfig,
    client: &dyn InferenceClient,
) -> Result<OcrStats, OcrError> {
    let session = ocr(input_str, config, client).await?;
    write_atomic(output_path.as_ref(), &session.text(&config.page_separator)).await?;
    Ok(session.stats())
}

/// Open a PDF and report its size and page count without calling the model.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<DocumentInfo, OcrError> {
    let document = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    render::inspect_document(document, RenderOptions::from_config(config)).await
}

/// Encode one page and send it to the model.
///
/// The returned entry carries the PNG preview when
/// [`OcrConfig::retain_page_images`] is set.
pub async fn ocr_page(
    page: PageImage,
    config: &OcrConfig,
    client: &dyn InferenceClient,
) -> PageEntry {
    let page_num = page.page_num;
    let start = Instant::now();

    let encoded = match encode_page(page_num, &page.image) {
        Ok(encoded) => encoded,
        Err(e) => {
            return PageEntry::failed(PageError::EncodeFailed {
                page: page_num,
                detail: e.to_string(),
            })
        }
    };
    drop(page);

    let outcome = client
        .extract_text(&encoded)
        .await
        .map(|text| OcrResult {
            page_num,
            text,
            duration_ms: start.elapsed().as_millis() as u64,
        })
        .map_err(|e| PageError::from_inference(page_num, e));

    let preview = config.retain_page_images.then_some(encoded);
    PageEntry {
        page_num,
        outcome,
        preview,
    }
}

/// Drive a page source through the model and collect the outcomes.
pub(crate) async fn process_pages<S>(
    pages: S,
    info: DocumentInfo,
    selected: usize,
    config: &OcrConfig,
    client: &dyn InferenceClient,
) -> Result<SessionAggregator, OcrError>
where
    S: Stream<Item = Result<PageImage, PageError>> + Unpin,
{
    let progress: &dyn OcrProgressCallback = config
        .progress_callback
        .as_deref()
        .unwrap_or(&NoopProgressCallback);

    let mut session = SessionAggregator::new();
    progress.on_document_start(&info, selected);
    session.begin(info, selected);

    let mut pages = pages;
    while let Some(page) = pages.next().await {
        let entry = match page {
            Ok(page) => {
                progress.on_page_start(page.page_num, selected);
                ocr_page(page, config, client).await
            }
            Err(e) => PageEntry::failed(e),
        };

        match &entry.outcome {
            Ok(result) => {
                debug!("Page {} done in {}ms", result.page_num, result.duration_ms);
                progress.on_page_complete(result.page_num, selected, result.text.len());
            }
            Err(e) => {
                warn!("{}", e);
                progress.on_page_error(entry.page_num, selected, &e.to_string());
                if config.failure_policy == FailurePolicy::FailFast {
                    return Err(OcrError::PageFailed {
                        page: entry.page_num,
                        source: e.clone(),
                    });
                }
            }
        }

        session
            .record(entry)
            .map_err(|e| OcrError::Internal(e.to_string()))?;
    }

    session
        .finish()
        .map_err(|e| OcrError::Internal(e.to_string()))?;

    let stats = session.stats();
    progress.on_document_complete(selected, stats.processed_pages);

    if stats.processed_pages == 0 {
        let first_error = session
            .failures()
            .next()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no page was produced".to_string());
        return Err(OcrError::AllPagesFailed {
            total: selected,
            first_error,
        });
    }

    info!(
        "OCR complete for '{}': {}/{} pages, {}ms",
        session.name(),
        stats.processed_pages,
        selected,
        stats.total_duration_ms
    );
    Ok(session)
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), OcrError> {
    let write_err = |source| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = temp_sibling(path);
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::PageSeparator;
    use crate::error::InferenceError;
    use crate::pipeline::encode::EncodedPage;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Answers each page from a script; unscripted pages echo `page N`.
    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        pub script: HashMap<usize, Result<String, InferenceError>>,
        pub calls: Mutex<Vec<usize>>,
    }

    impl ScriptedClient {
        pub fn with(mut self, page: usize, reply: Result<&str, InferenceError>) -> Self {
            self.script.insert(page, reply.map(str::to_string));
            self
        }

        pub fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn extract_text(&self, page: &EncodedPage) -> Result<String, InferenceError> {
            self.calls.lock().unwrap().push(page.page_num);
            self.script
                .get(&page.page_num)
                .cloned()
                .unwrap_or_else(|| Ok(format!("page {}", page.page_num)))
        }
    }

    pub(crate) fn page_image(page_num: usize) -> PageImage {
        PageImage {
            page_num,
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255; 4]))),
        }
    }

    pub(crate) fn pages(n: usize) -> Vec<Result<PageImage, PageError>> {
        (1..=n).map(|p| Ok(page_image(p))).collect()
    }

    pub(crate) fn doc_info(pages: usize) -> DocumentInfo {
        DocumentInfo {
            name: "test.pdf".into(),
            size_bytes: 100,
            page_count: pages,
        }
    }

    fn refused() -> InferenceError {
        InferenceError::Network {
            detail: "connection refused".into(),
        }
    }

    async fn run(
        source: Vec<Result<PageImage, PageError>>,
        config: &OcrConfig,
        client: &ScriptedClient,
    ) -> Result<SessionAggregator, OcrError> {
        let n = source.len();
        process_pages(futures::stream::iter(source), doc_info(n), n, config, client).await
    }

    #[tokio::test]
    async fn two_pages_hello_world() {
        let client = ScriptedClient::default()
            .with(1, Ok("Hello"))
            .with(2, Ok("World"));
        let session = run(pages(2), &OcrConfig::default(), &client).await.unwrap();
        assert_eq!(session.text(&PageSeparator::Newline), "Hello\nWorld");
        assert_eq!(client.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn best_effort_records_failure_and_continues() {
        let client = ScriptedClient::default().with(2, Err(refused()));
        let session = run(pages(3), &OcrConfig::default(), &client).await.unwrap();

        assert_eq!(client.calls(), vec![1, 2, 3]);
        assert_eq!(session.entry(1).and_then(PageEntry::text), Some("page 1"));
        assert_eq!(session.entry(3).and_then(PageEntry::text), Some("page 3"));
        assert!(matches!(
            session.entry(2).and_then(PageEntry::error),
            Some(PageError::Network { page: 2, .. })
        ));
        assert_eq!(session.text(&PageSeparator::Newline), "page 1\npage 3");
    }

    #[tokio::test]
    async fn fail_fast_aborts_on_first_failure() {
        let config = OcrConfig::builder()
            .failure_policy(FailurePolicy::FailFast)
            .build()
            .unwrap();
        let client = ScriptedClient::default().with(2, Err(refused()));
        let err = run(pages(3), &config, &client).await.unwrap_err();

        match err {
            OcrError::PageFailed { page, source } => {
                assert_eq!(page, 2);
                assert!(matches!(source, PageError::Network { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn every_page_failing_is_fatal() {
        let client = ScriptedClient::default()
            .with(1, Err(InferenceError::Timeout { secs: 60 }))
            .with(2, Err(refused()));
        let err = run(pages(2), &OcrConfig::default(), &client).await.unwrap_err();
        match err {
            OcrError::AllPagesFailed { total, first_error } => {
                assert_eq!(total, 2);
                assert!(first_error.contains("Page 1"), "got {first_error}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn render_failure_is_recorded_without_request() {
        let source = vec![
            Ok(page_image(1)),
            Err(PageError::RenderFailed {
                page: 2,
                detail: "bitmap allocation failed".into(),
            }),
        ];
        let client = ScriptedClient::default();
        let session = run(source, &OcrConfig::default(), &client).await.unwrap();
        assert_eq!(client.calls(), vec![1]);
        assert_eq!(session.stats().failed_pages, 1);
    }

    #[tokio::test]
    async fn text_is_returned_verbatim() {
        let raw = "  # Title\n\n```\ncode\n```\n\n";
        let client = ScriptedClient::default().with(1, Ok(raw));
        let session = run(pages(1), &OcrConfig::default(), &client).await.unwrap();
        assert_eq!(session.text(&PageSeparator::Newline), raw);
    }

    #[tokio::test]
    async fn previews_kept_only_when_requested() {
        let client = ScriptedClient::default();
        let session = run(pages(1), &OcrConfig::default(), &client).await.unwrap();
        assert!(session.entry(1).unwrap().preview.is_none());

        let config = OcrConfig::builder().retain_page_images(true).build().unwrap();
        let session = run(pages(1), &config, &client).await.unwrap();
        let preview = session.entry(1).unwrap().preview.as_ref().unwrap();
        assert_eq!((preview.width, preview.height), (4, 4));
    }

    #[tokio::test]
    async fn progress_callbacks_fire_per_page() {
        #[derive(Default)]
        struct Counts {
            started: AtomicUsize,
            completed: AtomicUsize,
            failed: AtomicUsize,
            done: AtomicUsize,
        }
        impl OcrProgressCallback for Counts {
            fn on_page_start(&self, _: usize, _: usize) {
                self.started.fetch_add(1, Ordering::SeqCst);
            }
            fn on_page_complete(&self, _: usize, _: usize, _: usize) {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            fn on_page_error(&self, _: usize, _: usize, _: &str) {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            fn on_document_complete(&self, _: usize, success_count: usize) {
                self.done.store(success_count, Ordering::SeqCst);
            }
        }

        let counts = Arc::new(Counts::default());
        let config = OcrConfig::builder()
            .progress_callback(counts.clone())
            .build()
            .unwrap();
        let client = ScriptedClient::default().with(3, Err(refused()));
        run(pages(3), &config, &client).await.unwrap();

        assert_eq!(counts.started.load(Ordering::SeqCst), 3);
        assert_eq!(counts.completed.load(Ordering::SeqCst), 2);
        assert_eq!(counts.failed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ocr_bytes_rejects_non_pdf_before_rendering() {
        let client = ScriptedClient::default();
        let err = ocr_bytes("notes.txt", b"plain text".to_vec(), &OcrConfig::default(), &client)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::NotAPdf { .. }), "got {err:?}");
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn write_atomic_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        write_atomic(&path, "first").await.unwrap();
        write_atomic(&path, "second").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_sibling(&path).exists());
    }
}
