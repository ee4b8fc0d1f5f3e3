//! Input resolution: turn a user-supplied path or URL into an in-memory [`Document`].
//!
//! Documents are read fully into memory; pdfium parses from the byte
//! buffer, so no temporary file is needed for downloads. The `%PDF`
//! signature is checked here so an obviously wrong upload fails with a
//! document-format error before pdfium is even bound.

use crate::error::OcrError;
use crate::output::Document;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// PDF readers accept the header anywhere in the first kilobyte.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to a [`Document`].
pub async fn resolve_input(input: &str, download_timeout_secs: u64) -> Result<Document, OcrError> {
    if input.trim().is_empty() {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    }
    let document = if is_url(input) {
        download_url(input, download_timeout_secs).await?
    } else {
        read_local(Path::new(input)).await?
    };
    validate_pdf(&document.name, &document.bytes)?;
    Ok(document)
}

/// Reject byte blobs that do not carry a `%PDF` header.
pub fn validate_pdf(name: &str, bytes: &[u8]) -> Result<(), OcrError> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if window.windows(4).any(|w| w == b"%PDF") {
        return Ok(());
    }
    Err(OcrError::NotAPdf {
        name: name.to_string(),
        magic: bytes.iter().take(4).copied().collect(),
    })
}

async fn read_local(path: &Path) -> Result<Document, OcrError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(Document::new(file_name(path), bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, OcrError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let download_err = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(download_err)?;
    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(download_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(Document::new(url_file_name(url), bytes.to_vec()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty path segment of the URL, or `downloaded.pdf`.
fn url_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn validate_accepts_pdf_header() {
        assert!(validate_pdf("a.pdf", b"%PDF-1.7\n...").is_ok());
        // Leading garbage before the header is tolerated.
        assert!(validate_pdf("a.pdf", b"\xef\xbb\xbf%PDF-1.4").is_ok());
    }

    #[test]
    fn validate_rejects_other_bytes() {
        let err = validate_pdf("notes.txt", b"hello world").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
        match err {
            OcrError::NotAPdf { magic, .. } => assert_eq!(magic, b"hell".to_vec()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(validate_pdf("empty.pdf", b"").is_err());
    }

    #[test]
    fn url_file_name_uses_last_segment() {
        assert_eq!(url_file_name("https://x.org/papers/a.pdf"), "a.pdf");
        assert_eq!(url_file_name("https://x.org/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn local_non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
    }
}
