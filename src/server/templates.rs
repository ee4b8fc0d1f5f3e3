//! Askama template structs for the web interface.
//!
//! Each struct corresponds to an HTML template in the `templates/` directory.

use askama::Template;
use pulldown_cmark::{html, Event, Options, Parser};
use uuid::Uuid;

use super::UploadedDocument;
use crate::session::PageEntry;

/// Upload form.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub title: &'a str,
    pub endpoint: &'a str,
    pub model: &'a str,
    pub has_session: bool,
    pub session_url: String,
}

/// Results for every document of one upload.
#[derive(Template)]
#[template(path = "session.html")]
pub struct SessionTemplate<'a> {
    pub title: &'a str,
    pub documents: Vec<DocumentView>,
    pub total_files: usize,
    pub total_pages: usize,
    pub has_results: bool,
    pub combined_url: String,
}

/// Error page template.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub title: &'a str,
    pub message: &'a str,
}

/// One uploaded file in the results view.
pub struct DocumentView {
    pub name: String,
    pub size_bytes: usize,
    pub page_count: usize,
    pub failed: bool,
    pub error: String,
    pub total_secs: String,
    pub pages: Vec<PageView>,
    pub text_url: String,
    pub markdown_url: String,
    /// The Markdown report rendered to HTML.
    pub markdown_html: String,
}

/// One page in the results view.
pub struct PageView {
    pub page_num: usize,
    pub ok: bool,
    pub text: String,
    pub error: String,
    pub seconds: String,
    pub has_image: bool,
    pub image_url: String,
    pub base64_len: usize,
}

impl DocumentView {
    pub fn new(session_id: Uuid, index: usize, doc: &UploadedDocument) -> Self {
        let base = format!("/sessions/{session_id}/documents/{index}");
        match &doc.result {
            Ok(agg) => {
                let stats = agg.stats();
                Self {
                    name: doc.name.clone(),
                    size_bytes: doc.size_bytes,
                    page_count: stats.total_pages,
                    failed: false,
                    error: String::new(),
                    total_secs: format_secs(stats.total_duration_ms),
                    pages: agg.entries().map(|e| PageView::new(&base, e)).collect(),
                    text_url: format!("{base}/text"),
                    markdown_url: format!("{base}/markdown"),
                    markdown_html: render_markdown(&agg.markdown_report()),
                }
            }
            Err(message) => Self {
                name: doc.name.clone(),
                size_bytes: doc.size_bytes,
                page_count: 0,
                failed: true,
                error: message.clone(),
                total_secs: String::new(),
                pages: Vec::new(),
                text_url: String::new(),
                markdown_url: String::new(),
                markdown_html: String::new(),
            },
        }
    }
}

impl PageView {
    fn new(base: &str, entry: &PageEntry) -> Self {
        let (ok, text, error, seconds) = match &entry.outcome {
            Ok(r) => (true, r.text.clone(), String::new(), format_secs(r.duration_ms)),
            Err(e) => (false, String::new(), e.to_string(), String::new()),
        };
        Self {
            page_num: entry.page_num,
            ok,
            text,
            error,
            seconds,
            has_image: entry.preview.is_some(),
            image_url: format!("{base}/pages/{}.png", entry.page_num),
            base64_len: entry.preview.as_ref().map_or(0, |p| p.png_base64.len()),
        }
    }
}

/// Render Markdown with tables. Raw HTML in the model's text is shown as
/// text, never passed through.
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn format_secs(ms: u64) -> String {
    format!("{:.2}", ms as f64 / 1000.0)
}
