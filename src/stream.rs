//! Streaming extraction: emit page results as they complete.
//!
//! Large scanned bundles take minutes to recognise. [`Extractor::stream_pages`]
//! runs the same stages as [`Extractor::process_document`] but yields each
//! [`PageExtractionResult`] as soon as its page finishes, so callers can show
//! partial results or persist pages incrementally.
//!
//! OCR pages arrive in completion order; sort by `page_num` if order
//! matters, or use [`crate::pipeline::assemble::join_pages`] after
//! [`crate::pipeline::assemble::order_pages`] to rebuild the document text.
//! When the native text layer is accepted, its pages are emitted in order.

use crate::config::ExtractionConfig;
use crate::error::IngestError;
use crate::extract::{Extractor, Prepared};
use crate::output::PageExtractionResult;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = PageExtractionResult> + Send>>;

impl Extractor {
    /// Extract `path`, streaming page results as they are ready.
    ///
    /// # Returns
    /// - `Ok(PageStream)`: one item per page, failed pages included
    /// - `Err(IngestError)`: document-level failure before any page ran
    pub async fn stream_pages(&self, path: impl AsRef<Path>) -> Result<PageStream, IngestError> {
        match self.prepare(path.as_ref()).await? {
            Prepared::Native { native, .. } => {
                info!("Streaming {} native page(s)", native.pages.len());
                Ok(Box::pin(stream::iter(native.pages)))
            }
            Prepared::Raster { pages, .. } => {
                let total_pages = pages.len();
                if let Some(ref cb) = self.config().progress_callback {
                    cb.on_job_start(total_pages);
                }
                info!("Streaming {} OCR page(s)", total_pages);

                let this = self.clone();
                let concurrency = self.config().concurrency;
                let s = stream::iter(pages)
                    .map(move |page| {
                        let this = this.clone();
                        async move { this.ocr_page(page, total_pages).await }
                    })
                    .buffer_unordered(concurrency);
                Ok(Box::pin(s))
            }
        }
    }
}

/// Stream a document's pages with default collaborators.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use legal_ingest::{process_stream, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut pages = process_stream("exhibit_b.pdf", &ExtractionConfig::default()).await?;
/// while let Some(page) = pages.next().await {
///     match page.error {
///         None => println!("Page {}: {} chars", page.page_num, page.text.len()),
///         Some(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_stream(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<PageStream, IngestError> {
    Extractor::new(config.clone()).stream_pages(path).await
}
