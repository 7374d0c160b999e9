//! The extraction strategist and the top-level entry points.
//!
//! ## Strategy
//!
//! ```text
//! Init ──▶ NativeAttempt ──▶ Accepted ─────────────────────────────┐
//!   │            │                                                 ▼
//!   │            └──▶ OcrFallback ──▶ PerPageOcr (bounded pool) ──▶ Assembled
//!   └──(image)─────────────────────────▶ PerPageOcr
//! ```
//!
//! * `Init` validates the path from a single `stat`; missing, oversized and
//!   unsupported inputs are rejected before any content is read.
//! * `NativeAttempt` (PDF only) reads the embedded text layer. If it is
//!   substantial the job ends there and the recognition engine is never
//!   called.
//! * `OcrFallback` rasterises the whole document (or decodes the single
//!   image), then each page runs orientation → normalisation → recognition
//!   on the blocking pool, at most `concurrency` at a time.
//! * `Assembled` re-sorts page results by index and joins them behind page
//!   banners.
//!
//! Only document-level failures surface as `Err`. Page failures, timeouts
//! and panics are recorded on the page and rendered as an inline marker.

use crate::config::ExtractionConfig;
use crate::error::{EngineError, IngestError, PageError};
use crate::output::{ExtractedDocument, ExtractionMethod, ExtractionStats, PageExtractionResult};
use crate::pipeline::assemble::{build_metadata, join_pages, order_pages};
use crate::pipeline::input::{DocumentFormat, SourceDocument};
use crate::pipeline::ocr::{process_page, OcrEngine, TesseractCli};
use crate::pipeline::orientation::OrientationChain;
use crate::pipeline::render::{load_image_page, PageImage, PdfiumRasterizer, Rasterizer};
use crate::pipeline::text_layer::{extract_native, NativeExtraction, TextLayer};
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs extraction jobs against a fixed configuration and set of
/// collaborators.
///
/// Cheap to clone; all state is shared behind `Arc`s and never mutated, so
/// one `Extractor` can serve many documents concurrently.
///
/// # Example
/// ```rust,no_run
/// use legal_ingest::{ExtractionConfig, Extractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = Extractor::new(ExtractionConfig::default());
/// let doc = extractor.process_document("validation_notice.pdf").await?;
/// println!("{} words via {:?}", doc.metadata.word_count, doc.metadata.method);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractionConfig>,
    rasterizer: Arc<dyn Rasterizer>,
    text_layer: Arc<dyn TextLayer>,
    engine: Arc<dyn OcrEngine>,
    orientation: Arc<OrientationChain>,
    /// Present only when the default tesseract engine is in use.
    probe: Option<Arc<EngineProbe>>,
}

type ProbeFn = dyn Fn() -> Result<String, EngineError> + Send + Sync;

/// One-shot availability check of the recognition engine.
///
/// Runs on the blocking pool the first time a document needs OCR, never at
/// construction, so native-only jobs never spawn the engine.
pub(crate) struct EngineProbe {
    check: Box<ProbeFn>,
    done: tokio::sync::OnceCell<()>,
}

impl EngineProbe {
    pub(crate) fn new(check: impl Fn() -> Result<String, EngineError> + Send + Sync + 'static) -> Self {
        Self {
            check: Box::new(check),
            done: tokio::sync::OnceCell::new(),
        }
    }

    /// Run the check once; a failure only logs a warning.
    pub(crate) async fn ensure(self: &Arc<Self>) {
        self.done
            .get_or_init(|| async {
                let this = Arc::clone(self);
                match tokio::task::spawn_blocking(move || (this.check)()).await {
                    Ok(Ok(version)) => info!("Recognition engine: {}", version),
                    Ok(Err(e)) => warn!("{}. OCR functionality will be limited", e),
                    Err(e) => warn!("Recognition engine probe failed: {}", e),
                }
            })
            .await;
    }

    #[cfg(test)]
    fn has_run(&self) -> bool {
        self.done.initialized()
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .field("orientation", &self.orientation)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Extractor`]; every collaborator not supplied gets the
/// default (pdfium for documents, the tesseract CLI for recognition).
pub struct ExtractorBuilder {
    config: ExtractionConfig,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    text_layer: Option<Arc<dyn TextLayer>>,
    engine: Option<Arc<dyn OcrEngine>>,
    orientation: Option<OrientationChain>,
}

impl ExtractorBuilder {
    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn text_layer(mut self, layer: Arc<dyn TextLayer>) -> Self {
        self.text_layer = Some(layer);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the standard OSD → Hough chain.
    pub fn orientation_chain(mut self, chain: OrientationChain) -> Self {
        self.orientation = Some(chain);
        self
    }

    /// Assemble the extractor. Never touches the engine or pdfium.
    ///
    /// When no engine was supplied the tesseract binary is probed once, on
    /// the first document that needs OCR. A failed probe only logs a
    /// warning: documents with a usable text layer never need the engine.
    pub fn build(self) -> Extractor {
        let config = self.config;
        let pdfium = PdfiumRasterizer::new(config.password.clone(), config.max_rendered_pixels);

        let (engine, probe) = match self.engine {
            Some(engine) => (engine, None),
            None => {
                let cli = TesseractCli::new(config.tesseract_path.clone());
                let checker = cli.clone();
                let probe = Arc::new(EngineProbe::new(move || checker.probe()));
                (Arc::new(cli) as Arc<dyn OcrEngine>, Some(probe))
            }
        };

        let orientation = self
            .orientation
            .unwrap_or_else(|| OrientationChain::standard(Arc::clone(&engine), config.orientation.clone()));

        Extractor {
            rasterizer: self
                .rasterizer
                .unwrap_or_else(|| Arc::new(pdfium.clone()) as Arc<dyn Rasterizer>),
            text_layer: self
                .text_layer
                .unwrap_or_else(|| Arc::new(pdfium) as Arc<dyn TextLayer>),
            engine,
            orientation: Arc::new(orientation),
            config: Arc::new(config),
            probe,
        }
    }
}

/// Result of the stages before per-page OCR.
pub(crate) enum Prepared {
    /// The native text layer was accepted; no OCR needed.
    Native {
        doc: Arc<SourceDocument>,
        native: NativeExtraction,
    },
    /// Pages ready for the OCR loop.
    Raster {
        doc: Arc<SourceDocument>,
        pages: Vec<PageImage>,
        dpi_used: Option<u32>,
        render_duration_ms: u64,
    },
}

impl Extractor {
    /// Extractor with default collaborators.
    pub fn new(config: ExtractionConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ExtractionConfig) -> ExtractorBuilder {
        ExtractorBuilder {
            config,
            rasterizer: None,
            text_layer: None,
            engine: None,
            orientation: None,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract the text of the document at `path`.
    ///
    /// # Errors
    /// Only document-level failures: [`IngestError::NotFound`],
    /// [`IngestError::SizeLimitExceeded`], [`IngestError::UnsupportedFormat`],
    /// [`IngestError::ConversionError`] and friends. Page failures are
    /// reported inside the returned document.
    pub async fn process_document(&self, path: impl AsRef<Path>) -> Result<ExtractedDocument, IngestError> {
        let total_start = Instant::now();

        match self.prepare(path.as_ref()).await? {
            Prepared::Native { doc, native } => Ok(self.accept_native(&doc, native, total_start)),
            Prepared::Raster {
                doc,
                pages,
                dpi_used,
                render_duration_ms,
            } => {
                let total_pages = pages.len();
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_start(total_pages);
                }

                let ocr_start = Instant::now();
                let results: Vec<PageExtractionResult> = stream::iter(
                    pages
                        .into_iter()
                        .map(|page| self.ocr_page(page, total_pages)),
                )
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;
                let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

                let pages = order_pages(results);
                let text = join_pages(&pages);
                let metadata = build_metadata(
                    &doc,
                    &text,
                    &pages,
                    total_pages,
                    ExtractionMethod::Ocr,
                    dpi_used,
                );

                let failed = pages.iter().filter(|p| p.error.is_some()).count();
                let stats = ExtractionStats {
                    total_pages,
                    processed_pages: total_pages - failed,
                    failed_pages: failed,
                    total_duration_ms: total_start.elapsed().as_millis() as u64,
                    render_duration_ms,
                    ocr_duration_ms,
                };

                info!(
                    "OCR extraction complete: {}/{} pages, {} words, {}ms total",
                    stats.processed_pages, total_pages, metadata.word_count, stats.total_duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_complete(total_pages, stats.processed_pages);
                }

                Ok(ExtractedDocument {
                    text,
                    metadata,
                    pages,
                    stats,
                })
            }
        }
    }

    /// Blocking wrapper around [`Extractor::process_document`].
    ///
    /// Creates a private tokio runtime; do not call from async code.
    pub fn process_document_sync(&self, path: impl AsRef<Path>) -> Result<ExtractedDocument, IngestError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process_document(path))
    }

    /// Extract a document held in memory.
    ///
    /// `extension` (with or without the leading dot) selects the format, as
    /// the file name would. The bytes are written to a managed temporary
    /// file that is removed on return.
    pub async fn process_bytes(&self, bytes: &[u8], extension: &str) -> Result<ExtractedDocument, IngestError> {
        let tmp = write_temp_input(bytes, extension)?;
        self.process_document(tmp.path()).await
    }

    /// Extract `path` and write the text to `output`.
    ///
    /// The text is written to a sibling temp file and renamed into place, so
    /// `output` is either absent or complete.
    pub async fn process_to_file(
        &self,
        path: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<crate::output::DocumentMetadata, IngestError> {
        let doc = self.process_document(path).await?;
        let output = output.as_ref();
        write_atomic(output, &doc.text).await?;
        info!("Wrote {} chars to {}", doc.metadata.char_count, output.display());
        Ok(doc.metadata)
    }

    // ── Stages ───────────────────────────────────────────────────────────

    /// Run `Init`, `NativeAttempt` and rasterisation.
    pub(crate) async fn prepare(&self, path: &Path) -> Result<Prepared, IngestError> {
        info!("Starting extraction: {}", path.display());
        let doc = Arc::new(SourceDocument::inspect(path, self.config.max_document_bytes)?);

        if doc.format() == DocumentFormat::Pdf {
            let native = self.native_attempt(&doc).await?;
            if native.success {
                return Ok(Prepared::Native { doc, native });
            }
            info!(
                "Text layer too thin ({} chars), falling back to OCR",
                native.content_chars
            );
        }

        if let Some(ref probe) = self.probe {
            probe.ensure().await;
        }

        let render_start = Instant::now();
        let (pages, dpi_used) = self.load_pages(&doc).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        info!("Prepared {} page(s) for OCR in {}ms", pages.len(), render_duration_ms);

        Ok(Prepared::Raster {
            doc,
            pages,
            dpi_used,
            render_duration_ms,
        })
    }

    async fn native_attempt(&self, doc: &Arc<SourceDocument>) -> Result<NativeExtraction, IngestError> {
        let layer = Arc::clone(&self.text_layer);
        let doc = Arc::clone(doc);
        let threshold = self.config.native_text_threshold;
        tokio::task::spawn_blocking(move || extract_native(layer.as_ref(), &doc, threshold))
            .await
            .map_err(|e| IngestError::Internal(format!("Text layer task failed: {}", e)))
    }

    /// Rasterise a PDF or decode a single image. `dpi_used` is set only when
    /// rasterisation actually happened.
    async fn load_pages(&self, doc: &Arc<SourceDocument>) -> Result<(Vec<PageImage>, Option<u32>), IngestError> {
        let doc = Arc::clone(doc);
        match doc.format() {
            DocumentFormat::Pdf => {
                let rasterizer = Arc::clone(&self.rasterizer);
                let dpi = self.config.dpi;
                let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&doc, dpi))
                    .await
                    .map_err(|e| IngestError::Internal(format!("Render task failed: {}", e)))??;
                Ok((pages, Some(dpi)))
            }
            DocumentFormat::Image => {
                let page = tokio::task::spawn_blocking(move || load_image_page(&doc))
                    .await
                    .map_err(|e| IngestError::Internal(format!("Image decode task failed: {}", e)))??;
                Ok((vec![page], None))
            }
        }
    }

    /// Run one page through the OCR pipeline on the blocking pool, with a
    /// timeout. Always yields a result for the page.
    pub(crate) async fn ocr_page(&self, page: PageImage, total_pages: usize) -> PageExtractionResult {
        let page_num = page.page_num();
        let start = Instant::now();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_start(page_num, total_pages);
        }

        let chain = Arc::clone(&self.orientation);
        let engine = Arc::clone(&self.engine);
        let config = Arc::clone(&self.config);
        let task = tokio::task::spawn_blocking(move || {
            process_page(&page, &chain, engine.as_ref(), &config.ocr, &config.normalize)
        });

        let secs = self.config.page_timeout_secs;
        let result = match tokio::time::timeout(Duration::from_secs(secs), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                let detail = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "task cancelled".to_string()
                };
                let err = PageError::Panicked { page: page_num, detail };
                warn!("{}", err);
                PageExtractionResult::failed(err, start.elapsed().as_millis() as u64)
            }
            Err(_) => {
                // The blocking task is detached and finishes on its own.
                let err = PageError::Timeout { page: page_num, secs };
                warn!("{}", err);
                PageExtractionResult::failed(err, start.elapsed().as_millis() as u64)
            }
        };

        if let Some(ref cb) = self.config.progress_callback {
            match &result.error {
                None => cb.on_page_complete(page_num, total_pages, result.text.chars().count()),
                Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
            }
        }
        result
    }

    fn accept_native(&self, doc: &SourceDocument, native: NativeExtraction, total_start: Instant) -> ExtractedDocument {
        let NativeExtraction {
            text,
            pages,
            page_count,
            ..
        } = native;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(page_count);
            cb.on_job_complete(page_count, pages.len());
        }

        let metadata = build_metadata(doc, &text, &pages, page_count, ExtractionMethod::Native, None);
        let stats = ExtractionStats {
            total_pages: page_count,
            processed_pages: pages.len(),
            failed_pages: 0,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            render_duration_ms: 0,
            ocr_duration_ms: 0,
        };
        info!(
            "Native extraction complete: {} pages, {} words, {}ms",
            page_count, metadata.word_count, stats.total_duration_ms
        );

        ExtractedDocument {
            text,
            metadata,
            pages,
            stats,
        }
    }
}

// ── Free-function entry points ───────────────────────────────────────────

/// Extract a document with default collaborators.
///
/// This is the primary entry point for the library.
pub async fn process_document(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractedDocument, IngestError> {
    Extractor::new(config.clone()).process_document(path).await
}

/// Synchronous wrapper around [`process_document`].
pub fn process_document_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractedDocument, IngestError> {
    Extractor::new(config.clone()).process_document_sync(path)
}

/// Extract a document held in memory; see [`Extractor::process_bytes`].
///
/// # Example
/// ```rust,no_run
/// use legal_ingest::{process_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.png")?;
/// let doc = process_bytes(&bytes, "png", &ExtractionConfig::default()).await?;
/// println!("{}", doc.text);
/// # Ok(())
/// # }
/// ```
pub async fn process_bytes(
    bytes: &[u8],
    extension: &str,
    config: &ExtractionConfig,
) -> Result<ExtractedDocument, IngestError> {
    Extractor::new(config.clone()).process_bytes(bytes, extension).await
}

/// Extract `path` and atomically write the text to `output`.
pub async fn process_to_file(
    path: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<crate::output::DocumentMetadata, IngestError> {
    Extractor::new(config.clone()).process_to_file(path, output).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) fn write_temp_input(bytes: &[u8], extension: &str) -> Result<tempfile::NamedTempFile, IngestError> {
    let ext = extension.trim_start_matches('.');
    let suffix = if ext.is_empty() { String::new() } else { format!(".{ext}") };
    let mut tmp = tempfile::Builder::new()
        .prefix("legal-ingest-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| IngestError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| IngestError::Internal(format!("tempfile write: {e}")))?;
    debug!("Buffered {} bytes to {}", bytes.len(), tmp.path().display());
    Ok(tmp)
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), IngestError> {
    let write_err = |e| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
