//! # legal-ingest
//!
//! Turn legal documents (PDFs, scans, photographed letters) into
//! page-delimited plain text plus metadata, ready for a downstream
//! classification or drafting step.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path
//!  │
//!  ├─ 1. Init       stat-only validation: exists, size limit, extension
//!  ├─ 2. Native     embedded PDF text layer; accepted when it carries
//!  │                more than `native_text_threshold` non-whitespace chars
//!  ├─ 3. Render     otherwise rasterise every page (pdfium, spawn_blocking)
//!  ├─ 4. Per page   orientation (OSD → Hough) → rotate/denoise/binarise → OCR
//!  │                on a bounded pool; failures stay on their page
//!  └─ 5. Assemble   page banners in source order + word/char counts
//! ```
//!
//! The text carries a fixed banner before every page, which downstream
//! consumers use for citations:
//!
//! ```text
//! ============================================================
//! PAGE 1
//! ============================================================
//!
//! ...
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use legal_ingest::{process_document, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     let doc = process_document("collection_letter.pdf", &config).await?;
//!     println!("{}", doc.text);
//!     eprintln!(
//!         "{} words, {} chars, DPI {}",
//!         doc.metadata.word_count,
//!         doc.metadata.char_count,
//!         doc.metadata.dpi_display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! * **pdfium** is loaded at runtime: set `PDFIUM_LIB_PATH` or install
//!   libpdfium on the system library path.
//! * **tesseract** is invoked as a subprocess. If it cannot be found the
//!   library still works for PDFs with a text layer; OCR pages are marked
//!   as failed.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! legal-ingest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, NormalizeSettings, OcrSettings, OrientationSettings,
};
pub use error::{EngineError, IngestError, PageError};
pub use extract::{
    process_bytes, process_document, process_document_sync, process_to_file, Extractor,
    ExtractorBuilder,
};
pub use output::{
    DocumentMetadata, ExtractedDocument, ExtractionMethod, ExtractionStats, PageExtractionResult,
};
pub use pipeline::input::{DocumentFormat, SourceDocument};
pub use pipeline::ocr::{OcrEngine, TesseractCli};
pub use pipeline::orientation::{OrientationChain, OrientationResult, OrientationStrategy, Rotation};
pub use pipeline::render::{PageImage, Rasterizer};
pub use pipeline::text_layer::TextLayer;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{process_stream, PageStream};
