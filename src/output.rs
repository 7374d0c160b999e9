//! Output types returned by the extraction entry points.

use crate::error::PageError;
use crate::pipeline::input::DocumentFormat;
use serde::{Deserialize, Serialize};

/// Which strategy produced the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// The PDF's embedded text layer was sufficient.
    Native,
    /// Pages were rasterised (or loaded as an image) and recognised.
    Ocr,
}

/// Outcome of extracting a single page.
///
/// An ordered sequence of these, one per page with no gaps, is what the
/// assembler consumes. A failed page keeps its slot with `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExtractionResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Extracted text, empty when the page failed.
    pub text: String,
    /// Set when this page could not be processed.
    pub error: Option<PageError>,
    /// Rotation applied before recognition, in degrees (OCR pages only).
    pub rotation_degrees: Option<u32>,
    /// Whether the rotation came from the geometric fallback detector.
    pub rotation_from_fallback: bool,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
}

impl PageExtractionResult {
    /// A page whose text came straight from the native text layer.
    pub fn native(page_num: usize, text: String) -> Self {
        Self {
            page_num,
            text,
            error: None,
            rotation_degrees: None,
            rotation_from_fallback: false,
            duration_ms: 0,
        }
    }

    /// A page that failed; its text slot is empty.
    pub fn failed(error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num: error.page(),
            text: String::new(),
            error: Some(error),
            rotation_degrees: None,
            rotation_from_fallback: false,
            duration_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Descriptive metadata computed from the final assembled text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File name without directories.
    pub filename: String,
    /// Lower-cased extension including the dot, e.g. `.pdf`.
    pub file_type: String,
    /// Declared format.
    pub format: DocumentFormat,
    /// Size in MiB, rounded to two decimals.
    pub size_mb: f64,
    /// Exact size in bytes.
    pub size_bytes: u64,
    /// Unicode scalar count of the assembled text.
    pub char_count: usize,
    /// Whitespace-separated token count of the assembled text.
    pub word_count: usize,
    /// Rasterisation density; `None` when no rasterisation happened.
    pub dpi_used: Option<u32>,
    /// Number of pages in the job.
    pub page_count: usize,
    /// Strategy that produced the text.
    pub method: ExtractionMethod,
    /// 1-indexed pages replaced by an error marker.
    pub failed_pages: Vec<usize>,
}

impl DocumentMetadata {
    /// `dpi_used` formatted for display, `N/A` when no rasterisation happened.
    pub fn dpi_display(&self) -> String {
        self.dpi_used
            .map(|d| d.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Timing and page counters for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_duration_ms: u64,
    /// Time spent rasterising (0 on the native path).
    pub render_duration_ms: u64,
    /// Time spent in the per-page OCR loop (0 on the native path).
    pub ocr_duration_ms: u64,
}

/// Final result of a successful job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Page-delimited plain text.
    pub text: String,
    pub metadata: DocumentMetadata,
    /// Per-page outcomes in page order.
    pub pages: Vec<PageExtractionResult>,
    pub stats: ExtractionStats,
}

impl ExtractedDocument {
    /// Split into the `(text, metadata)` pair consumed downstream.
    pub fn into_parts(self) -> (String, DocumentMetadata) {
        (self.text, self.metadata)
    }
}
