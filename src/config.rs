//! Configuration types for document ingestion.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Every knob lives in one struct so a
//! config can be shared across worker threads and logged as a whole.

use crate::error::IngestError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One mebibyte, the unit of the size limit.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration for a document extraction job.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use legal_ingest::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .max_document_size_mb(50)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rasterisation density used for the OCR fallback. Range: 72–600. Default: 300.
    ///
    /// Tesseract is trained on glyphs of roughly 20–30 px cap height; 300 DPI
    /// puts 10–12 pt body text in that range.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 8000.
    ///
    /// A safety cap independent of DPI: an oversized page (engineering
    /// drawing, exhibit poster) is scaled down rather than allocating a
    /// multi-gigabyte bitmap.
    pub max_rendered_pixels: u32,

    /// Largest accepted source file in bytes. Default: 50 MiB.
    ///
    /// The boundary is inclusive: a file of exactly this size is accepted.
    pub max_document_bytes: u64,

    /// Minimum non-whitespace characters the native text layer must yield
    /// before OCR is skipped. Default: 100.
    pub native_text_threshold: usize,

    /// Number of pages recognised concurrently. Default: available CPU cores.
    pub concurrency: usize,

    /// Per-page OCR timeout in seconds. Default: 300.
    ///
    /// Covers denoising as well as recognition. The default denoiser makes
    /// `search_window²` passes over the page, tens of seconds per 300 DPI
    /// page in release builds and far more in debug builds.
    pub page_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to the tesseract binary. If None, `tesseract` on `PATH`.
    pub tesseract_path: Option<PathBuf>,

    /// Recognition engine settings.
    pub ocr: OcrSettings,

    /// Geometric orientation fallback settings.
    pub orientation: OrientationSettings,

    /// Denoise / binarisation settings.
    pub normalize: NormalizeSettings,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 8000,
            max_document_bytes: 50 * BYTES_PER_MB,
            native_text_threshold: 100,
            concurrency: default_concurrency(),
            page_timeout_secs: 300,
            password: None,
            tesseract_path: None,
            ocr: OcrSettings::default(),
            orientation: OrientationSettings::default(),
            normalize: NormalizeSettings::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("native_text_threshold", &self.native_text_threshold)
            .field("concurrency", &self.concurrency)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tesseract_path", &self.tesseract_path)
            .field("ocr", &self.ocr)
            .field("orientation", &self.orientation)
            .field("normalize", &self.normalize)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    /// Size limit in whole mebibytes.
    pub fn max_document_size_mb(mut self, mb: u64) -> Self {
        self.config.max_document_bytes = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Size limit in bytes, for limits that are not a whole number of MiB.
    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn native_text_threshold(mut self, chars: usize) -> Self {
        self.config.native_text_threshold = chars;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = Some(path.into());
        self
    }

    pub fn ocr(mut self, settings: OcrSettings) -> Self {
        self.config.ocr = settings;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr.language = lang.into();
        self
    }

    pub fn orientation(mut self, settings: OrientationSettings) -> Self {
        self.config.orientation = settings;
        self
    }

    pub fn normalize(mut self, settings: NormalizeSettings) -> Self {
        self.config.normalize = settings;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, IngestError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(IngestError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(IngestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_document_bytes == 0 {
            return Err(IngestError::InvalidConfig(
                "Maximum document size must be > 0".into(),
            ));
        }
        if c.ocr.language.trim().is_empty() {
            return Err(IngestError::InvalidConfig("OCR language must not be empty".into()));
        }
        c.normalize.validate()?;
        if c.orientation.top_k == 0 {
            return Err(IngestError::InvalidConfig("Hough top-K must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Engine settings ──────────────────────────────────────────────────────

/// Settings passed to the recognition engine on every call.
///
/// Defaults correspond to `-l eng --oem 3 --psm 6`: the legacy and LSTM
/// engines combined, reading the page as a single uniform block of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Tesseract language code(s), e.g. `eng` or `eng+spa`.
    pub language: String,
    /// Page segmentation mode (`--psm`). 6 = single uniform block.
    pub page_seg_mode: u8,
    /// OCR engine mode (`--oem`). 3 = default (legacy + LSTM where available).
    pub engine_mode: u8,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_seg_mode: 6,
            engine_mode: 3,
        }
    }
}

impl OcrSettings {
    /// Render as tesseract command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-l".to_string(),
            self.language.clone(),
            "--oem".to_string(),
            self.engine_mode.to_string(),
            "--psm".to_string(),
            self.page_seg_mode.to_string(),
        ]
    }
}

/// Parameters of the edge/line-angle orientation fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationSettings {
    /// Canny hysteresis low threshold.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
    /// Minimum accumulator votes for a Hough line.
    pub vote_threshold: u32,
    /// Number of strongest lines whose angles feed the median.
    pub top_k: usize,
}

impl Default for OrientationSettings {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 200,
            top_k: 50,
        }
    }
}

/// Denoise and adaptive-threshold parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeSettings {
    /// Run the non-local-means denoiser. Default: true.
    pub denoise: bool,
    /// Filter strength `h`; higher removes more noise and more detail. Default: 10.
    pub denoise_strength: f32,
    /// Side of the square patch compared between pixels (odd). Default: 7.
    pub template_window: u32,
    /// Side of the square search area around each pixel (odd). Default: 21.
    /// Denoise time grows with its square.
    pub search_window: u32,
    /// Side of the local neighbourhood used for the threshold (odd, ≥ 3). Default: 11.
    pub threshold_block_size: u32,
    /// Constant subtracted from the weighted local mean. Default: 2.
    pub threshold_offset: i32,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            denoise: true,
            denoise_strength: 10.0,
            template_window: 7,
            search_window: 21,
            threshold_block_size: 11,
            threshold_offset: 2,
        }
    }
}

impl NormalizeSettings {
    fn validate(&self) -> Result<(), IngestError> {
        if self.template_window % 2 == 0 || self.search_window % 2 == 0 {
            return Err(IngestError::InvalidConfig(format!(
                "Denoise windows must be odd, got template={} search={}",
                self.template_window, self.search_window
            )));
        }
        if self.threshold_block_size < 3 || self.threshold_block_size % 2 == 0 {
            return Err(IngestError::InvalidConfig(format!(
                "Threshold block size must be odd and ≥ 3, got {}",
                self.threshold_block_size
            )));
        }
        if self.denoise && self.denoise_strength <= 0.0 {
            return Err(IngestError::InvalidConfig(
                "Denoise strength must be > 0".into(),
            ));
        }
        Ok(())
    }
}
