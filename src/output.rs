//! Data carried between pipeline stages and returned to callers.

use serde::{Deserialize, Serialize};

/// An uploaded or downloaded PDF, held entirely in memory.
#[derive(Clone)]
pub struct Document {
    /// Display name, usually the file name of the upload.
    pub name: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// What is known about a document once it has been opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub size_bytes: usize,
    /// Pages in the whole document, not only the selected ones.
    pub page_count: usize,
}

/// Extracted text for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Completion text exactly as returned by the model.
    pub text: String,
    /// Wall-clock time spent encoding and waiting for the model.
    pub duration_ms: u64,
}

/// Summary numbers for a finished document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrStats {
    pub total_pages: usize,
    pub selected_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_duration_ms: u64,
}
