//! Per-page progress events for OCR jobs.
//!
//! A scanned bundle can take minutes, so callers that show a progress bar or
//! record job status register an [`ExtractionProgressCallback`] with
//! [`crate::config::ExtractionConfigBuilder::progress_callback`].
//!
//! Event order for a document that falls back to OCR:
//!
//! ```text
//! on_job_start(n)
//!   on_page_start(p, n) ─┬─▶ on_page_complete(p, n, chars)
//!                        └─▶ on_page_error(p, n, message)   (engine error, timeout, panic)
//! on_job_complete(n, ok)
//! ```
//!
//! When the native text layer is accepted there is no per-page work: only
//! `on_job_start` and `on_job_complete` fire, back to back.
//!
//! # Example
//!
//! ```rust
//! use legal_ingest::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailedPages(AtomicUsize);
//!
//! impl ExtractionProgressCallback for FailedPages {
//!     fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num} needs manual review: {error}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(FailedPages(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Receives job and page events from an [`crate::Extractor`].
///
/// Pages are recognised on a worker pool, so `on_page_*` may be called
/// concurrently and out of page order. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Page count is known: after the text-layer decision and rasterisation.
    fn on_job_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page enters orientation detection.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page is recognised successfully.
    ///
    /// `text_len` is the character count of the recognised text.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// A page failed and will carry the inline error marker. `error` is the
    /// display form of the page's [`crate::PageError`].
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Every page has been attempted; `success_count` excludes failed pages.
    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EventLog(Mutex<Vec<String>>);

    impl EventLog {
        fn push(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl ExtractionProgressCallback for EventLog {
        fn on_page_complete(&self, page_num: usize, _total_pages: usize, text_len: usize) {
            self.push(format!("ok {page_num} {text_len}"));
        }

        fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
            self.push(format!("err {page_num} {error}"));
        }
    }

    #[test]
    fn unimplemented_events_are_ignored() {
        let log = EventLog::default();
        log.on_job_start(2);
        log.on_page_start(1, 2);
        log.on_page_complete(1, 2, 812);
        log.on_page_error(2, 2, "Page 2 timed out after 300s");
        log.on_job_complete(2, 1);

        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["ok 1 812", "err 2 Page 2 timed out after 300s"]
        );
    }

    #[test]
    fn noop_fits_the_config_slot() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_start(1);
        cb.on_job_complete(1, 1);
    }
}
