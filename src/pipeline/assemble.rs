//! Document assembly: join per-page text behind page banners and measure
//! the result.
//!
//! The banner layout is a contract with downstream consumers, which key off
//! it for citations:
//!
//! ```text
//! ============================================================
//! PAGE 3
//! ============================================================
//!
//! <page text>
//! ```
//!
//! Sections are separated by a blank line. A failed page keeps its banner and
//! carries `[ERROR: Could not process page N]` as its body.

use crate::output::{DocumentMetadata, ExtractionMethod, PageExtractionResult};
use crate::pipeline::input::SourceDocument;

/// Width of the `=` rule above and below each page label.
pub const RULE_WIDTH: usize = 60;

/// The banner that opens the section for page `page_num`.
pub fn page_banner(page_num: usize) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!("{rule}\nPAGE {page_num}\n{rule}\n\n")
}

/// Inline marker written in place of a page that could not be processed.
pub fn error_marker(page_num: usize) -> String {
    format!("[ERROR: Could not process page {page_num}]")
}

/// Join page sections in the order given.
pub fn join_pages(pages: &[PageExtractionResult]) -> String {
    join_sections(pages.iter())
}

/// Like [`join_pages`], but pages whose text is blank get no section. Used
/// for native text layers, where scanned pages often carry a stray newline.
pub fn join_non_blank(pages: &[PageExtractionResult]) -> String {
    join_sections(
        pages
            .iter()
            .filter(|p| p.error.is_some() || !p.text.trim().is_empty()),
    )
}

fn join_sections<'a>(pages: impl Iterator<Item = &'a PageExtractionResult>) -> String {
    pages
        .map(|p| {
            let mut section = page_banner(p.page_num);
            if p.error.is_some() {
                section.push_str(&error_marker(p.page_num));
            } else {
                section.push_str(&p.text);
            }
            section
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Sort results by page number; completion order from the worker pool is
/// arbitrary.
pub fn order_pages(mut pages: Vec<PageExtractionResult>) -> Vec<PageExtractionResult> {
    pages.sort_by_key(|p| p.page_num);
    pages
}

/// `(char_count, word_count)` of `text`: Unicode scalar values and
/// whitespace-separated tokens.
pub fn measure(text: &str) -> (usize, usize) {
    (text.chars().count(), text.split_whitespace().count())
}

/// Compute metadata from the final assembled text.
pub fn build_metadata(
    doc: &SourceDocument,
    text: &str,
    pages: &[PageExtractionResult],
    page_count: usize,
    method: ExtractionMethod,
    dpi_used: Option<u32>,
) -> DocumentMetadata {
    let (char_count, word_count) = measure(text);
    DocumentMetadata {
        filename: doc.filename(),
        file_type: doc.file_type(),
        format: doc.format(),
        size_mb: doc.size_mb(),
        size_bytes: doc.size_bytes(),
        char_count,
        word_count,
        dpi_used,
        page_count,
        method,
        failed_pages: pages
            .iter()
            .filter(|p| p.error.is_some())
            .map(|p| p.page_num)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;

    fn ok(n: usize, text: &str) -> PageExtractionResult {
        PageExtractionResult::native(n, text.to_string())
    }

    #[test]
    fn banner_layout() {
        let b = page_banner(12);
        let lines: Vec<&str> = b.lines().collect();
        assert_eq!(lines[0], "=".repeat(60));
        assert_eq!(lines[1], "PAGE 12");
        assert_eq!(lines[2], "=".repeat(60));
        assert!(b.ends_with("\n\n"));
    }

    #[test]
    fn failed_page_keeps_banner_and_gets_marker() {
        let pages = vec![
            ok(1, "first"),
            PageExtractionResult::failed(
                PageError::Recognition {
                    page: 2,
                    detail: "boom".into(),
                },
                5,
            ),
            ok(3, "third"),
        ];
        let text = join_pages(&pages);
        let p1 = text.find("PAGE 1").unwrap();
        let p2 = text.find("PAGE 2").unwrap();
        let p3 = text.find("PAGE 3").unwrap();
        assert!(p1 < p2 && p2 < p3);
        assert!(text.contains("[ERROR: Could not process page 2]"));
        assert!(!text.contains("boom"));
    }

    #[test]
    fn order_pages_sorts_by_index() {
        let pages = order_pages(vec![ok(3, "c"), ok(1, "a"), ok(2, "b")]);
        let nums: Vec<usize> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[test]
    fn measure_counts_unicode_scalars() {
        let (chars, words) = measure("Débiteur  §809\nnotice");
        assert_eq!(chars, 21);
        assert_eq!(words, 3);
        assert_eq!(measure(""), (0, 0));
    }

    #[test]
    fn metadata_counts_match_text() {
        let f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        let doc = SourceDocument::inspect(f.path(), u64::MAX).unwrap();
        let pages = vec![ok(1, "validation notice"), ok(2, "cease and desist")];
        let text = join_pages(&pages);

        let meta = build_metadata(&doc, &text, &pages, 2, ExtractionMethod::Native, None);
        assert_eq!(meta.char_count, text.chars().count());
        assert_eq!(meta.word_count, text.split_whitespace().count());
        assert_eq!(meta.file_type, ".pdf");
        assert_eq!(meta.dpi_display(), "N/A");
        assert!(meta.failed_pages.is_empty());
    }
}
