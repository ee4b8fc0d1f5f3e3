//! Pipeline stages for PDF OCR.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ client
//! (URL/path)  (pdfium)  (base64)  (chat completions)
//! ```
//!
//! 1. [`input`]  resolves a path or URL to an in-memory document
//! 2. [`render`] rasterises pages one at a time on a blocking thread
//! 3. [`encode`] PNG-encodes each page for the `image_url` content part
//! 4. [`client`] sends one request per page; the only stage with network I/O

pub mod client;
pub mod encode;
pub mod input;
pub mod render;
