//! PDF rasterisation: lazily render selected pages to `DynamicImage` via pdfium.
//!
//! [`Rasterizer`] is a plain blocking iterator: each call to `next()` renders
//! exactly one page. [`spawn_rasterizer`] drives it on a `spawn_blocking`
//! thread and hands pages to async code through a channel of capacity 1, so
//! at most one rendered page is waiting ahead of the consumer.
//!
//! Resolution is `dpi / 72` scale (PDF user space is 72 units per inch),
//! with both edges capped at `max_rendered_pixels`.

use crate::config::{OcrConfig, PageSelection};
use crate::error::{OcrError, PageError};
use crate::output::{Document, DocumentInfo};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// One rendered page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: DynamicImage,
}

/// The subset of [`OcrConfig`] the rasterizer needs, owned so it can move
/// onto the blocking thread.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
    pub pages: PageSelection,
    pub pdfium_lib_path: Option<PathBuf>,
}

impl RenderOptions {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            pages: config.pages.clone(),
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

/// Bind to a pdfium library.
///
/// Lookup order: `explicit`, `PDFIUM_LIB_PATH`, the working directory, the
/// system library search path.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, OcrError> {
    let env_path = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
    let candidate = explicit.map(Path::to_path_buf).or(env_path);

    let bindings = match candidate {
        Some(path) => Pdfium::bind_to_library(&path).map_err(|e| {
            OcrError::PdfiumBindingFailed(format!("{}: {}", path.display(), e))
        })?,
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| OcrError::PdfiumBindingFailed(e.to_string()))?,
    };

    Ok(Pdfium::new(bindings))
}

/// Lazy, single-pass page renderer over one open document.
pub struct Rasterizer<'a> {
    document: PdfDocument<'a>,
    render_config: PdfRenderConfig,
    info: DocumentInfo,
    remaining: std::vec::IntoIter<usize>,
}

impl<'a> Rasterizer<'a> {
    /// Open `document` and prepare to render the pages `options` selects.
    ///
    /// Fails with a document-format error when pdfium cannot parse the bytes.
    /// An empty selection is not an error here; see [`Rasterizer::require_pages`].
    pub fn open(
        pdfium: &'a Pdfium,
        document: Document,
        options: &RenderOptions,
    ) -> Result<Self, OcrError> {
        let Document { name, bytes } = document;
        let size_bytes = bytes.len();
        let password = options.password.as_deref();

        let pdf = pdfium
            .load_pdf_from_byte_vec(bytes, password)
            .map_err(|e| match e {
                PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                    if password.is_some() {
                        OcrError::WrongPassword { name: name.clone() }
                    } else {
                        OcrError::PasswordRequired { name: name.clone() }
                    }
                }
                other => OcrError::CorruptPdf {
                    name: name.clone(),
                    detail: other.to_string(),
                },
            })?;

        let page_count = pdf.pages().len() as usize;
        info!("PDF '{}' loaded: {} pages", name, page_count);

        let indices = options.pages.to_indices(page_count);

        let scale = options.dpi as f32 / 72.0;
        let cap = options.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(cap)
            .set_maximum_height(cap);

        Ok(Self {
            document: pdf,
            render_config,
            info: DocumentInfo {
                name,
                size_bytes,
                page_count,
            },
            remaining: indices.into_iter(),
        })
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Reject a selection that matches no page of the document.
    pub fn require_pages(self) -> Result<Self, OcrError> {
        if self.remaining.len() == 0 {
            return Err(OcrError::PageOutOfRange {
                total: self.info.page_count,
            });
        }
        Ok(self)
    }

    fn render(&self, idx: usize) -> Result<PageImage, PageError> {
        let page_num = idx + 1;
        let page = self
            .document
            .pages()
            .get(idx as u16)
            .map_err(|e| PageError::RenderFailed {
                page: page_num,
                detail: e.to_string(),
            })?;

        let bitmap = page
            .render_with_config(&self.render_config)
            .map_err(|e| PageError::RenderFailed {
                page: page_num,
                detail: e.to_string(),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        Ok(PageImage { page_num, image })
    }
}

impl Iterator for Rasterizer<'_> {
    type Item = Result<PageImage, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.remaining.next()?;
        Some(self.render(idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.remaining.size_hint()
    }
}

impl ExactSizeIterator for Rasterizer<'_> {}

/// Pages arriving from the blocking render thread.
pub struct PageFeed {
    pub info: DocumentInfo,
    /// Number of pages the selection will yield.
    pub selected: usize,
    pages: mpsc::Receiver<Result<PageImage, PageError>>,
}

impl PageFeed {
    /// Receive the next page, or `None` once the document is exhausted.
    pub async fn next_page(&mut self) -> Option<Result<PageImage, PageError>> {
        self.pages.recv().await
    }

    pub fn into_stream(self) -> ReceiverStream<Result<PageImage, PageError>> {
        ReceiverStream::new(self.pages)
    }
}

/// Open `document` on a blocking thread and start rendering pages on demand.
///
/// Returns once the document has been parsed, so format errors surface here
/// and no page is ever produced for an unparseable blob.
pub async fn spawn_rasterizer(
    document: Document,
    options: RenderOptions,
) -> Result<PageFeed, OcrError> {
    let (opened_tx, opened_rx) = oneshot::channel::<Result<(DocumentInfo, usize), OcrError>>();
    let (page_tx, page_rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || {
        let pdfium = match bind_pdfium(options.pdfium_lib_path.as_deref()) {
            Ok(p) => p,
            Err(e) => {
                let _ = opened_tx.send(Err(e));
                return;
            }
        };
        let rasterizer = match Rasterizer::open(&pdfium, document, &options)
            .and_then(Rasterizer::require_pages)
        {
            Ok(r) => r,
            Err(e) => {
                let _ = opened_tx.send(Err(e));
                return;
            }
        };
        if opened_tx
            .send(Ok((rasterizer.info().clone(), rasterizer.len())))
            .is_err()
        {
            return;
        }

        for page in rasterizer {
            if page_tx.blocking_send(page).is_err() {
                warn!("Page consumer dropped; stopping rasterisation early");
                break;
            }
        }
    });

    let (info, selected) = opened_rx
        .await
        .map_err(|_| OcrError::Internal("Render thread exited before opening the document".into()))??;

    Ok(PageFeed {
        info,
        selected,
        pages: page_rx,
    })
}

/// Open a document only to read its page count. A document with no pages
/// reports `page_count: 0`.
pub async fn inspect_document(
    document: Document,
    options: RenderOptions,
) -> Result<DocumentInfo, OcrError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(options.pdfium_lib_path.as_deref())?;
        let all = RenderOptions {
            pages: PageSelection::All,
            ..options
        };
        Rasterizer::open(&pdfium, document, &all).map(|r| r.info().clone())
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Inspect task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_options_copy_config() {
        let config = OcrConfig::builder()
            .dpi(200)
            .password("pw")
            .pages(PageSelection::Single(2))
            .build()
            .unwrap();
        let opts = RenderOptions::from_config(&config);
        assert_eq!(opts.dpi, 200);
        assert_eq!(opts.password.as_deref(), Some("pw"));
        assert_eq!(opts.pages, PageSelection::Single(2));
    }

    #[test]
    fn binding_to_missing_library_fails_cleanly() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so"))).unwrap_err();
        assert!(matches!(err, OcrError::PdfiumBindingFailed(_)), "got {err:?}");
    }
}
