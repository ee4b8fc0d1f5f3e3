//! Per-document result store.
//!
//! A [`SessionAggregator`] holds the page results for the document currently
//! being processed, keyed and iterated by page number. It moves through three
//! states:
//!
//! ```text
//!   Empty ──begin──▶ Accumulating ──finish──▶ Complete
//!     ▲                  │  ▲                    │
//!     └──────reset───────┘  └───────begin────────┘
//! ```
//!
//! `begin` from any state discards whatever was there: a new upload replaces
//! the previous one. Nothing is persisted.

use crate::config::PageSeparator;
use crate::error::PageError;
use crate::output::{DocumentInfo, OcrResult, OcrStats};
use crate::pipeline::encode::EncodedPage;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;
use thiserror::Error;

/// File name of the multi-document text download.
pub const COMBINED_FILE_NAME: &str = "combined_ocr_output.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Accumulating,
    Complete,
}

/// Misuse of the aggregator's state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no document has been started")]
    NotStarted,

    #[error("document '{name}' is already complete")]
    AlreadyComplete { name: String },

    #[error("page {page} has already been recorded")]
    DuplicatePage { page: usize },
}

/// Everything known about one page after it has been attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEntry {
    pub page_num: usize,
    pub outcome: Result<OcrResult, PageError>,
    /// The PNG that was sent, kept only when the caller asked for previews.
    pub preview: Option<EncodedPage>,
}

impl PageEntry {
    pub fn succeeded(result: OcrResult) -> Self {
        Self {
            page_num: result.page_num,
            outcome: Ok(result),
            preview: None,
        }
    }

    pub fn failed(error: PageError) -> Self {
        Self {
            page_num: error.page(),
            outcome: Err(error),
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Option<EncodedPage>) -> Self {
        self.preview = preview;
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(|r| r.text.as_str())
    }

    pub fn error(&self) -> Option<&PageError> {
        self.outcome.as_ref().err()
    }
}

/// Ordered page → entry map for the active document.
#[derive(Debug)]
pub struct SessionAggregator {
    state: SessionState,
    info: Option<DocumentInfo>,
    selected_pages: usize,
    entries: BTreeMap<usize, PageEntry>,
    started: Option<Instant>,
    elapsed_ms: u64,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            info: None,
            selected_pages: 0,
            entries: BTreeMap::new(),
            started: None,
            elapsed_ms: 0,
        }
    }

    /// Start accumulating results for a freshly opened document.
    pub fn begin(&mut self, info: DocumentInfo, selected_pages: usize) {
        self.state = SessionState::Accumulating;
        self.info = Some(info);
        self.selected_pages = selected_pages;
        self.entries.clear();
        self.started = Some(Instant::now());
        self.elapsed_ms = 0;
    }

    /// Store the outcome of one page.
    pub fn record(&mut self, entry: PageEntry) -> Result<(), SessionError> {
        match self.state {
            SessionState::Empty => return Err(SessionError::NotStarted),
            SessionState::Complete => {
                return Err(SessionError::AlreadyComplete {
                    name: self.name().to_string(),
                })
            }
            SessionState::Accumulating => {}
        }
        if self.entries.contains_key(&entry.page_num) {
            return Err(SessionError::DuplicatePage {
                page: entry.page_num,
            });
        }
        self.entries.insert(entry.page_num, entry);
        Ok(())
    }

    /// Seal the document. Calling it twice is harmless.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Empty => Err(SessionError::NotStarted),
            SessionState::Complete => Ok(()),
            SessionState::Accumulating => {
                self.elapsed_ms = self
                    .started
                    .map(|t| t.elapsed().as_millis() as u64)
                    .unwrap_or_default();
                self.state = SessionState::Complete;
                Ok(())
            }
        }
    }

    /// Drop everything and return to `Empty`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn info(&self) -> Option<&DocumentInfo> {
        self.info.as_ref()
    }

    /// Document name, or an empty string before `begin`.
    pub fn name(&self) -> &str {
        self.info.as_ref().map(|i| i.name.as_str()).unwrap_or_default()
    }

    /// Entries in page order.
    pub fn entries(&self) -> impl Iterator<Item = &PageEntry> {
        self.entries.values()
    }

    pub fn entry(&self, page_num: usize) -> Option<&PageEntry> {
        self.entries.get(&page_num)
    }

    /// Successful results in page order.
    pub fn results(&self) -> impl Iterator<Item = &OcrResult> {
        self.entries.values().filter_map(|e| e.outcome.as_ref().ok())
    }

    /// Failed pages in page order.
    pub fn failures(&self) -> impl Iterator<Item = &PageError> {
        self.entries.values().filter_map(PageEntry::error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Successful page texts joined in page order.
    pub fn text(&self, separator: &PageSeparator) -> String {
        separator.join(self.results().map(|r| r.text.as_str()))
    }

    /// Markdown report with one section per page.
    ///
    /// Failed pages get an error line instead of a text block.
    pub fn markdown_report(&self) -> String {
        let mut out = format!("# OCR Results for {}\n\n", self.name());
        for entry in self.entries.values() {
            let _ = write!(out, "## Page {}\n\n", entry.page_num);
            match &entry.outcome {
                Ok(result) => {
                    let _ = write!(
                        out,
                        "**Processing Time**: {:.2} seconds\n\n```text\n{}\n```\n\n",
                        result.duration_ms as f64 / 1000.0,
                        result.text
                    );
                }
                Err(error) => {
                    let _ = write!(out, "**Error**: {}\n\n", error);
                }
            }
        }
        out
    }

    /// `ocr_<name>.txt`
    pub fn text_file_name(&self) -> String {
        format!("ocr_{}.txt", self.name())
    }

    /// `ocr_<name>.md`
    pub fn markdown_file_name(&self) -> String {
        format!("ocr_{}.md", self.name())
    }

    pub fn stats(&self) -> OcrStats {
        let failed_pages = self.failures().count();
        let total_duration_ms = match (self.state, self.started) {
            (SessionState::Complete, _) => self.elapsed_ms,
            (_, Some(t)) => t.elapsed().as_millis() as u64,
            _ => 0,
        };
        OcrStats {
            total_pages: self.info.as_ref().map(|i| i.page_count).unwrap_or_default(),
            selected_pages: self.selected_pages,
            processed_pages: self.entries.len() - failed_pages,
            failed_pages,
            total_duration_ms,
        }
    }
}

/// Every successful page of every document, labelled with its origin.
///
/// Blocks look like `File: <name> - Page <n>\n<text>` and are separated by a
/// blank line.
pub fn combined_text<'a>(documents: impl IntoIterator<Item = &'a SessionAggregator>) -> String {
    documents
        .into_iter()
        .flat_map(|doc| {
            doc.results()
                .map(move |r| format!("File: {} - Page {}\n{}", doc.name(), r.page_num, r.text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, pages: usize) -> DocumentInfo {
        DocumentInfo {
            name: name.into(),
            size_bytes: 1234,
            page_count: pages,
        }
    }

    fn ok(page_num: usize, text: &str) -> PageEntry {
        PageEntry::succeeded(OcrResult {
            page_num,
            text: text.into(),
            duration_ms: 1500,
        })
    }

    fn started(name: &str, pages: usize) -> SessionAggregator {
        let mut agg = SessionAggregator::new();
        agg.begin(info(name, pages), pages);
        agg
    }

    #[test]
    fn record_before_begin_is_rejected() {
        let mut agg = SessionAggregator::new();
        assert_eq!(agg.record(ok(1, "x")), Err(SessionError::NotStarted));
        assert_eq!(agg.finish(), Err(SessionError::NotStarted));
        assert_eq!(agg.state(), SessionState::Empty);
    }

    #[test]
    fn two_pages_join_with_newline() {
        let mut agg = started("doc.pdf", 2);
        agg.record(ok(1, "Hello")).unwrap();
        agg.record(ok(2, "World")).unwrap();
        agg.finish().unwrap();
        assert_eq!(agg.text(&PageSeparator::default()), "Hello\nWorld");
        assert_eq!(agg.state(), SessionState::Complete);
    }

    #[test]
    fn entries_are_ordered_by_page_not_arrival() {
        let mut agg = started("doc.pdf", 3);
        agg.record(ok(3, "c")).unwrap();
        agg.record(ok(1, "a")).unwrap();
        agg.record(ok(2, "b")).unwrap();
        let pages: Vec<usize> = agg.entries().map(|e| e.page_num).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(agg.text(&PageSeparator::BlankLine), "a\n\nb\n\nc");
    }

    #[test]
    fn duplicate_page_is_rejected_and_first_kept() {
        let mut agg = started("doc.pdf", 2);
        agg.record(ok(1, "first")).unwrap();
        assert_eq!(
            agg.record(ok(1, "second")),
            Err(SessionError::DuplicatePage { page: 1 })
        );
        assert_eq!(agg.entry(1).and_then(PageEntry::text), Some("first"));
    }

    #[test]
    fn record_after_finish_is_rejected() {
        let mut agg = started("doc.pdf", 1);
        agg.finish().unwrap();
        assert!(matches!(
            agg.record(ok(1, "late")),
            Err(SessionError::AlreadyComplete { .. })
        ));
        assert!(agg.finish().is_ok());
    }

    #[test]
    fn begin_discards_previous_document() {
        let mut agg = started("old.pdf", 1);
        agg.record(ok(1, "old text")).unwrap();
        agg.finish().unwrap();

        agg.begin(info("new.pdf", 2), 2);
        assert_eq!(agg.state(), SessionState::Accumulating);
        assert!(agg.is_empty());
        assert_eq!(agg.name(), "new.pdf");
        agg.record(ok(1, "new text")).unwrap();
        assert_eq!(agg.text(&PageSeparator::Newline), "new text");
    }

    #[test]
    fn failed_pages_are_left_out_of_text() {
        let mut agg = started("doc.pdf", 3);
        agg.record(ok(1, "one")).unwrap();
        agg.record(PageEntry::failed(PageError::Timeout { page: 2, secs: 60 }))
            .unwrap();
        agg.record(ok(3, "three")).unwrap();
        agg.finish().unwrap();

        assert_eq!(agg.text(&PageSeparator::Newline), "one\nthree");
        let stats = agg.stats();
        assert_eq!(stats.processed_pages, 2);
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(stats.selected_pages, 3);
        assert_eq!(agg.failures().map(PageError::page).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn markdown_report_layout() {
        let mut agg = started("scan.pdf", 2);
        agg.record(ok(1, "Hello")).unwrap();
        agg.record(PageEntry::failed(PageError::Network {
            page: 2,
            detail: "connection refused".into(),
        }))
        .unwrap();

        let md = agg.markdown_report();
        assert_eq!(
            md,
            "# OCR Results for scan.pdf\n\n\
             ## Page 1\n\n\
             **Processing Time**: 1.50 seconds\n\n\
             ```text\nHello\n```\n\n\
             ## Page 2\n\n\
             **Error**: Page 2: network error: connection refused\n\n"
        );
        assert_eq!(agg.markdown_file_name(), "ocr_scan.pdf.md");
        assert_eq!(agg.text_file_name(), "ocr_scan.pdf.txt");
    }

    #[test]
    fn combined_text_labels_every_page() {
        let mut a = started("a.pdf", 2);
        a.record(ok(1, "A1")).unwrap();
        a.record(ok(2, "A2")).unwrap();
        let mut b = started("b.pdf", 1);
        b.record(ok(1, "B1")).unwrap();

        assert_eq!(
            combined_text(&[a, b]),
            "File: a.pdf - Page 1\nA1\n\nFile: a.pdf - Page 2\nA2\n\nFile: b.pdf - Page 1\nB1"
        );
        assert_eq!(combined_text(Vec::<&SessionAggregator>::new()), "");
    }

    #[test]
    fn reset_returns_to_empty() {
        let mut agg = started("doc.pdf", 1);
        agg.record(ok(1, "x")).unwrap();
        agg.reset();
        assert_eq!(agg.state(), SessionState::Empty);
        assert!(agg.info().is_none());
        assert_eq!(agg.stats(), OcrStats::default());
    }
}
