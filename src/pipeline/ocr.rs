//! Optical character recognition for a single page.
//!
//! [`OcrEngine`] is the seam to the recognition engine. The default
//! implementation, [`TesseractCli`], drives the `tesseract` executable: one
//! process per call, input handed over as a temporary PNG, text read back
//! from stdout. The same binary answers orientation queries through its OSD
//! mode (`--psm 0`).
//!
//! [`process_page`] is the per-page unit of work the strategist fans out:
//! orientation → normalisation → recognition. It never returns an error;
//! failures are captured in the returned [`PageExtractionResult`].

use crate::config::{NormalizeSettings, OcrSettings};
use crate::error::{EngineError, PageError};
use crate::output::PageExtractionResult;
use crate::pipeline::encode::write_temp_png;
use crate::pipeline::normalize::normalize;
use crate::pipeline::orientation::OrientationChain;
use crate::pipeline::render::PageImage;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;
use tracing::{debug, warn};

/// Recognition engine used for OCR and orientation detection.
///
/// Implementations must be usable from several worker threads at once.
pub trait OcrEngine: Send + Sync {
    /// Recognise the text on `image`.
    fn recognize(&self, image: &DynamicImage, settings: &OcrSettings) -> Result<String, EngineError>;

    /// Clockwise rotation in degrees (0, 90, 180 or 270) that makes `image`
    /// upright.
    fn detect_orientation(&self, image: &DynamicImage) -> Result<u32, EngineError>;
}

/// Default binary name looked up on `PATH`.
pub const TESSERACT_BINARY: &str = "tesseract";

static OSD_ROTATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Rotate:\s*(\d+)").expect("valid regex"));

/// [`OcrEngine`] backed by the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TesseractCli {
    /// Use `binary`, or `tesseract` from `PATH` when `None`.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| PathBuf::from(TESSERACT_BINARY)),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Check the engine can be launched; returns its version line.
    pub fn probe(&self) -> Result<String, EngineError> {
        let output = self.run(["--version"])?;
        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(banner.lines().next().unwrap_or_default().trim().to_string())
    }

    fn run<I, S>(&self, args: I) -> Result<Output, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.binary).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Unavailable(format!("'{}' not found", self.binary.display()))
            } else {
                EngineError::Io(e)
            }
        })
    }

    fn write_input(image: &DynamicImage) -> Result<tempfile::NamedTempFile, EngineError> {
        write_temp_png(image).map_err(|e| EngineError::Io(std::io::Error::other(e)))
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &DynamicImage, settings: &OcrSettings) -> Result<String, EngineError> {
        let input = Self::write_input(image)?;
        let mut args: Vec<String> = vec![
            input.path().to_string_lossy().into_owned(),
            "stdout".to_string(),
        ];
        args.extend(settings.to_args());

        let output = self.run(&args)?;
        if !output.status.success() {
            return Err(EngineError::Failed(stderr_summary(&output)));
        }
        Ok(clean_ocr_text(&String::from_utf8_lossy(&output.stdout)))
    }

    fn detect_orientation(&self, image: &DynamicImage) -> Result<u32, EngineError> {
        let input = Self::write_input(image)?;
        let path = input.path().to_string_lossy().into_owned();
        let output = self.run([path.as_str(), "stdout", "-l", "osd", "--psm", "0"])?;
        if !output.status.success() {
            return Err(EngineError::Failed(stderr_summary(&output)));
        }

        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        parse_osd_rotation(&report).ok_or_else(|| {
            EngineError::UnparsableOutput(format!("no rotation in OSD output: {}", report.trim()))
        })
    }
}

fn stderr_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

/// Pull the `Rotate: N` value out of an OSD report.
pub fn parse_osd_rotation(report: &str) -> Option<u32> {
    OSD_ROTATE_RE
        .captures(report)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Strip the engine's page-break form feed and normalise line endings.
pub fn clean_ocr_text(raw: &str) -> String {
    raw.replace('\x0c', "")
        .replace("\r\n", "\n")
        .trim_end()
        .to_string()
}

/// Orient, normalise and recognise one page.
pub fn process_page(
    page: &PageImage,
    chain: &OrientationChain,
    engine: &dyn OcrEngine,
    ocr: &OcrSettings,
    normalize_settings: &NormalizeSettings,
) -> PageExtractionResult {
    let start = Instant::now();
    let page_num = page.page_num();

    let orientation = chain.detect(page);
    let prepared = match normalize(page, orientation.rotation, normalize_settings) {
        Ok(p) => p,
        Err(e) => {
            warn!("{}", e);
            return PageExtractionResult::failed(e, start.elapsed().as_millis() as u64);
        }
    };

    let mut result = match engine.recognize(prepared.image(), ocr) {
        Ok(text) => {
            debug!(
                "Page {}: recognised {} chars in {}ms",
                page_num,
                text.len(),
                start.elapsed().as_millis()
            );
            PageExtractionResult {
                page_num,
                text,
                error: None,
                rotation_degrees: None,
                rotation_from_fallback: false,
                duration_ms: 0,
            }
        }
        Err(e) => {
            let err = PageError::Recognition {
                page: page_num,
                detail: e.to_string(),
            };
            warn!("{}", err);
            PageExtractionResult::failed(err, 0)
        }
    };

    result.rotation_degrees = Some(orientation.rotation.degrees());
    result.rotation_from_fallback = orientation.from_fallback;
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orientation::{OrientationStrategy, Rotation};
    use image::{GrayImage, Luma};
    use std::sync::{Arc, Mutex};

    const OSD_SAMPLE: &str = "Page number: 0\n\
Orientation in degrees: 270\n\
Rotate: 90\n\
Orientation confidence: 4.73\n\
Script: Latin\n\
Script confidence: 2.15\n";

    /// Records the dimensions and pixel values it was asked to read.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u32, u32, bool)>>,
        fail: bool,
    }

    impl OcrEngine for Recorder {
        fn recognize(&self, image: &DynamicImage, _settings: &OcrSettings) -> Result<String, EngineError> {
            let gray = image.to_luma8();
            let binary = gray.pixels().all(|p| p[0] == 0 || p[0] == 255);
            self.seen
                .lock()
                .unwrap()
                .push((image.width(), image.height(), binary));
            if self.fail {
                Err(EngineError::Failed("simulated crash".into()))
            } else {
                Ok("NOTICE OF DEBT".into())
            }
        }

        fn detect_orientation(&self, _image: &DynamicImage) -> Result<u32, EngineError> {
            Err(EngineError::Unavailable("no osd".into()))
        }
    }

    struct Always(Rotation);

    impl OrientationStrategy for Always {
        fn name(&self) -> &'static str {
            "always"
        }
        fn detect(&self, _page: &PageImage) -> Result<Rotation, EngineError> {
            Ok(self.0)
        }
    }

    fn fast_normalize() -> NormalizeSettings {
        NormalizeSettings {
            template_window: 3,
            search_window: 5,
            ..NormalizeSettings::default()
        }
    }

    fn page(n: usize) -> PageImage {
        PageImage::detached(n, DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 20, Luma([200]))))
    }

    #[test]
    fn parses_rotate_line() {
        assert_eq!(parse_osd_rotation(OSD_SAMPLE), Some(90));
        assert_eq!(parse_osd_rotation("Rotate: 0"), Some(0));
        assert_eq!(parse_osd_rotation("Too few characters. Skipping this page"), None);
    }

    #[test]
    fn cleans_form_feed_and_crlf() {
        assert_eq!(clean_ocr_text("Line one\r\nLine two\n\x0c"), "Line one\nLine two");
        assert_eq!(clean_ocr_text("\x0c"), "");
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = TesseractCli::new(Some(PathBuf::from("/nonexistent/bin/tesseract-xyz")));
        assert!(matches!(engine.probe(), Err(EngineError::Unavailable(_))));

        let img = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let err = engine.recognize(&img, &OcrSettings::default()).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[test]
    fn default_binary_is_on_path() {
        assert_eq!(TesseractCli::default().binary(), Path::new("tesseract"));
    }

    #[test]
    fn process_page_rotates_then_recognises_binary_image() {
        let engine = Recorder::default();
        let chain = OrientationChain::new(vec![Arc::new(Always(Rotation::Cw90))]);

        let result = process_page(&page(2), &chain, &engine, &OcrSettings::default(), &fast_normalize());

        assert!(result.is_ok());
        assert_eq!(result.page_num, 2);
        assert_eq!(result.text, "NOTICE OF DEBT");
        assert_eq!(result.rotation_degrees, Some(90));
        assert!(!result.rotation_from_fallback);
        assert_eq!(*engine.seen.lock().unwrap(), vec![(20, 30, true)]);
    }

    #[test]
    fn recognition_failure_is_captured() {
        let engine = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let chain = OrientationChain::new(vec![]);

        let result = process_page(&page(3), &chain, &engine, &OcrSettings::default(), &fast_normalize());

        assert!(!result.is_ok());
        assert_eq!(result.page_num, 3);
        assert!(result.text.is_empty());
        match result.error {
            Some(PageError::Recognition { page, detail }) => {
                assert_eq!(page, 3);
                assert!(detail.contains("simulated crash"));
            }
            other => panic!("expected recognition error, got {other:?}"),
        }
    }

    #[test]
    fn empty_page_fails_in_preprocessing() {
        let engine = Recorder::default();
        let chain = OrientationChain::new(vec![]);
        let empty = PageImage::detached(5, DynamicImage::ImageLuma8(GrayImage::new(0, 0)));

        let result = process_page(&empty, &chain, &engine, &OcrSettings::default(), &fast_normalize());

        assert!(matches!(result.error, Some(PageError::Preprocess { page: 5, .. })));
        assert!(engine.seen.lock().unwrap().is_empty());
    }
}
