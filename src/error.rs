//! Error types for the legal-ingest library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`IngestError`]: **Fatal**. The document cannot be processed at all
//!   (missing file, oversized, unsupported extension, undecodable PDF).
//!   Returned as `Err(IngestError)` from the top-level `process*` functions.
//!
//! * [`PageError`]: **Non-fatal**. A single page failed during OCR but every
//!   other page is fine. Stored inside [`crate::output::PageExtractionResult`]
//!   and rendered as an inline marker in the assembled text.
//!
//! * [`EngineError`]: a failure reported by the external recognition engine
//!   (tesseract or a caller-supplied [`crate::pipeline::ocr::OcrEngine`]).
//!   The per-page pipeline converts these into [`PageError`]s; the orientation
//!   chain swallows them and moves on to the next strategy.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the legal-ingest library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageExtractionResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source path does not resolve to a readable file.
    #[error("Document not found: '{path}'\nCheck the path exists and is a regular file.")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// File is larger than the configured maximum. Raised before any decode.
    #[error("Document '{path}' is {size_bytes} bytes, exceeding the {limit_bytes}-byte limit")]
    SizeLimitExceeded {
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },

    /// File extension is outside the supported set.
    #[error(
        "Unsupported format '{extension}' for '{path}'\nSupported: .pdf, .png, .jpg, .jpeg, .tiff, .tif, .bmp"
    )]
    UnsupportedFormat { path: PathBuf, extension: String },

    // ── Decode errors ─────────────────────────────────────────────────────
    /// Document-level rasterisation or decode failure (corrupt structure,
    /// unreadable image). Fatal because page boundaries are not yet known.
    #[error("Could not decode '{path}': {detail}")]
    ConversionError { path: PathBuf, detail: String },

    /// PDF requires a password but none (or a wrong one) was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory) or install\n\
libpdfium on the system library path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page's slot in the assembled text is replaced by
/// `[ERROR: Could not process page N]`; all other pages are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The recognition engine failed on this page.
    #[error("Page {page}: recognition failed: {detail}")]
    Recognition { page: usize, detail: String },

    /// Image normalisation failed on this page.
    #[error("Page {page}: preprocessing failed: {detail}")]
    Preprocess { page: usize, detail: String },

    /// The page did not finish within the configured timeout.
    #[error("Page {page}: OCR timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The worker processing this page panicked.
    #[error("Page {page}: worker panicked: {detail}")]
    Panicked { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Recognition { page, .. }
            | PageError::Preprocess { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::Panicked { page, .. } => *page,
        }
    }
}

/// Errors reported by an OCR / orientation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot be reached or initialised (binary missing, no
    /// language data). Degrades to limited OCR rather than failing startup.
    #[error("Recognition engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but reported a failure.
    #[error("Recognition engine failed: {0}")]
    Failed(String),

    /// The engine produced output that could not be interpreted.
    #[error("Unparsable engine output: {0}")]
    UnparsableOutput(String),

    /// Local I/O around the engine call failed (temp file, pipes).
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit_display() {
        let e = IngestError::SizeLimitExceeded {
            path: PathBuf::from("big.pdf"),
            size_bytes: 52_428_801,
            limit_bytes: 52_428_800,
        };
        let msg = e.to_string();
        assert!(msg.contains("52428801"), "got: {msg}");
        assert!(msg.contains("52428800-byte limit"), "got: {msg}");
    }

    #[test]
    fn unsupported_format_display() {
        let e = IngestError::UnsupportedFormat {
            path: PathBuf::from("brief.docx"),
            extension: ".docx".into(),
        };
        assert!(e.to_string().contains(".docx"));
        assert!(e.to_string().contains("Supported"));
    }

    #[test]
    fn page_error_reports_its_page() {
        let e = PageError::Timeout { page: 7, secs: 30 };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().contains("30s"));

        let e = PageError::Recognition {
            page: 3,
            detail: "engine crashed".into(),
        };
        assert_eq!(e.page(), 3);
        assert!(e.to_string().contains("engine crashed"));
    }

    #[test]
    fn engine_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "tesseract");
        let e: EngineError = io.into();
        assert!(matches!(e, EngineError::Io(_)));
    }
}
