//! Text extraction for uploaded documents.
//!
//! Uploads supply bytes plus the original file name; this module returns
//! plain UTF-8 text. PDF is the primary format; plain text and markdown are
//! accepted as-is (they already are what extraction would produce).

use std::path::Path;
use thiserror::Error;

/// File extensions accepted for ingestion.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: .{0}")]
    UnsupportedExtension(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8")]
    Utf8,
}

/// Lowercased extension of a file name, or empty string when absent.
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(name: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&file_extension(name).as_str())
}

/// Extracts plain text from file content. The caller decides whether empty
/// output is an error (ingestion treats it as one).
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension {
        "pdf" => extract_pdf(bytes),
        "txt" | "md" => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Utf8),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
