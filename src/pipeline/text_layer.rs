//! Native text-layer extraction.
//!
//! A PDF produced by a word processor carries its text as glyph runs that
//! can be read back without any image analysis. Scanned PDFs usually carry
//! nothing, or a handful of stray whitespace and ligature artefacts. The
//! native strategy therefore only declares success when the embedded text
//! has more than `threshold` non-whitespace characters; otherwise the
//! strategist falls back to OCR.

use crate::error::IngestError;
use crate::output::PageExtractionResult;
use crate::pipeline::assemble;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render::{bind_pdfium, open_pdf, PdfiumRasterizer};
use tracing::{debug, info};

/// Reads the embedded text of a structured document, page by page.
pub trait TextLayer: Send + Sync {
    /// Return `(page_num, text)` pairs, 1-indexed, in source order.
    fn extract_embedded_text(&self, doc: &SourceDocument) -> Result<Vec<(usize, String)>, IngestError>;
}

impl TextLayer for PdfiumRasterizer {
    fn extract_embedded_text(&self, doc: &SourceDocument) -> Result<Vec<(usize, String)>, IngestError> {
        let pdfium = bind_pdfium()?;
        let document = open_pdf(&pdfium, doc.path(), self.password.as_deref())?;

        let mut pages = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page
                .text()
                .map(|t| t.all())
                .map_err(|e| IngestError::ConversionError {
                    path: doc.path().to_path_buf(),
                    detail: format!("text layer of page {} unreadable: {:?}", idx + 1, e),
                })?;
            pages.push((idx + 1, text));
        }
        Ok(pages)
    }
}

/// Result of the native strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeExtraction {
    /// Page-delimited text; empty when the layer was unreadable.
    pub text: String,
    /// Per-page results for the pages that carried text.
    pub pages: Vec<PageExtractionResult>,
    /// Pages in the document, including blank ones.
    pub page_count: usize,
    /// Non-whitespace characters across all page texts (banners excluded).
    pub content_chars: usize,
    /// True when `content_chars` exceeds the threshold.
    pub success: bool,
}

/// Count characters that are not whitespace.
pub fn non_whitespace_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Run the native strategy.
///
/// Every page gets a result, blank ones included, but blank pages are left
/// out of the joined text. Any failure
/// reading the layer is logged and reported as `success = false` so the
/// strategist can still try OCR.
pub fn extract_native(layer: &dyn TextLayer, doc: &SourceDocument, threshold: usize) -> NativeExtraction {
    let raw = match layer.extract_embedded_text(doc) {
        Ok(pages) => pages,
        Err(e) => {
            debug!("Native text extraction failed: {}", e);
            return NativeExtraction {
                text: String::new(),
                pages: Vec::new(),
                page_count: 0,
                content_chars: 0,
                success: false,
            };
        }
    };

    let page_count = raw.len();
    let pages: Vec<PageExtractionResult> = raw
        .into_iter()
        .map(|(page_num, text)| PageExtractionResult::native(page_num, text))
        .collect();

    let content_chars: usize = pages.iter().map(|p| non_whitespace_chars(&p.text)).sum();
    let success = content_chars > threshold;
    let text = assemble::join_non_blank(&pages);

    if success {
        info!(
            "Native text layer accepted: {} chars across {}/{} pages",
            content_chars,
            pages.iter().filter(|p| !p.text.trim().is_empty()).count(),
            page_count
        );
    } else {
        debug!(
            "Native text layer insufficient: {} chars (threshold {})",
            content_chars, threshold
        );
    }

    NativeExtraction {
        text,
        pages,
        page_count,
        content_chars,
        success,
    }
}
