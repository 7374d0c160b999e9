//! Page sources: rasterise a PDF into [`PageImage`]s, or load a standalone
//! image as a single page.
//!
//! ## Why a trait?
//!
//! Rasterisation is an external capability (pdfium here). The strategist
//! only depends on [`Rasterizer`], so tests can substitute an in-memory
//! implementation and callers can plug in a different renderer.
//!
//! ## Restartable
//!
//! [`PdfiumRasterizer`] binds the library and opens the document afresh on
//! every call; nothing is shared between invocations. A decode failure is
//! fatal for the whole document because page boundaries are not yet known.

use crate::error::IngestError;
use crate::pipeline::input::SourceDocument;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Environment variable pointing at a pdfium shared library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// A decoded raster page.
///
/// Normalisation never mutates a `PageImage`; each step produces a new one
/// via [`PageImage::derive`].
#[derive(Debug, Clone)]
pub struct PageImage {
    page_num: usize,
    image: DynamicImage,
    origin: Weak<SourceDocument>,
}

impl PageImage {
    /// Wrap `image` as page `page_num` (1-indexed) of `origin`.
    pub fn new(page_num: usize, image: DynamicImage, origin: &Arc<SourceDocument>) -> Self {
        Self {
            page_num,
            image,
            origin: Arc::downgrade(origin),
        }
    }

    /// A page with no originating document (ad-hoc images, tests).
    pub fn detached(page_num: usize, image: DynamicImage) -> Self {
        Self {
            page_num,
            image,
            origin: Weak::new(),
        }
    }

    /// A new page with the same index and origin but different pixels.
    pub fn derive(&self, image: DynamicImage) -> Self {
        Self {
            page_num: self.page_num,
            image,
            origin: self.origin.clone(),
        }
    }

    pub fn page_num(&self) -> usize {
        self.page_num
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// The source document, if it is still alive.
    pub fn origin(&self) -> Option<Arc<SourceDocument>> {
        self.origin.upgrade()
    }
}

/// Converts a paginated document into page images in source order.
pub trait Rasterizer: Send + Sync {
    /// Render every page of `doc` at `dpi`.
    ///
    /// Returned pages are numbered from 1 in source order.
    fn rasterize(&self, doc: &Arc<SourceDocument>, dpi: u32) -> Result<Vec<PageImage>, IngestError>;
}

/// pdfium-backed rasteriser and text layer.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    /// PDF user password for encrypted documents.
    pub password: Option<String>,
    /// Cap on either rendered dimension; 0 disables the cap.
    pub max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(password: Option<String>, max_rendered_pixels: u32) -> Self {
        Self {
            password,
            max_rendered_pixels,
        }
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, doc: &Arc<SourceDocument>, dpi: u32) -> Result<Vec<PageImage>, IngestError> {
        let pdfium = bind_pdfium()?;
        let document = open_pdf(&pdfium, doc.path(), self.password.as_deref())?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("Rasterising {} pages at {} DPI", total_pages, dpi);

        // PDF user space is 72 units per inch.
        let mut render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        if self.max_rendered_pixels > 0 {
            render_config = render_config
                .set_maximum_width(self.max_rendered_pixels as i32)
                .set_maximum_height(self.max_rendered_pixels as i32);
        }

        let mut results = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| IngestError::ConversionError {
                    path: doc.path().to_path_buf(),
                    detail: format!("page {} could not be rendered: {:?}", idx + 1, e),
                })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            results.push(PageImage::new(idx + 1, image, doc));
        }

        Ok(results)
    }
}

/// Decode a standalone image file as page 1.
pub fn load_image_page(doc: &Arc<SourceDocument>) -> Result<PageImage, IngestError> {
    let image = image::open(doc.path()).map_err(|e| IngestError::ConversionError {
        path: doc.path().to_path_buf(),
        detail: format!("image decode failed: {e}"),
    })?;
    debug!(
        "Loaded image {} → {}x{} px",
        doc.path().display(),
        image.width(),
        image.height()
    );
    Ok(PageImage::new(1, image, doc))
}

/// Bind to a pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH` (a library file or a directory
/// containing one), the system library path, then the working directory.
pub fn bind_pdfium() -> Result<Pdfium, IngestError> {
    if let Ok(custom) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        if !custom.is_empty() {
            let path = PathBuf::from(&custom);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            let bindings = Pdfium::bind_to_library(&lib).map_err(|e| {
                IngestError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?;
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")))
        .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Open a PDF, mapping pdfium failures onto document-level errors.
pub(crate) fn open_pdf<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, IngestError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            IngestError::PasswordRequired {
                path: path.to_path_buf(),
            }
        } else {
            IngestError::ConversionError {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn derived_page_keeps_index_and_origin() {
        let f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let doc = Arc::new(SourceDocument::inspect(f.path(), u64::MAX).unwrap());
        let page = PageImage::new(4, DynamicImage::ImageLuma8(GrayImage::new(3, 2)), &doc);

        let derived = page.derive(DynamicImage::ImageLuma8(GrayImage::new(2, 3)));
        assert_eq!(derived.page_num(), 4);
        assert_eq!((derived.width(), derived.height()), (2, 3));
        assert_eq!(derived.origin().as_deref(), Some(doc.as_ref()));
        // Original untouched.
        assert_eq!((page.width(), page.height()), (3, 2));
    }

    #[test]
    fn origin_is_weak() {
        let f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let doc = Arc::new(SourceDocument::inspect(f.path(), u64::MAX).unwrap());
        let page = PageImage::new(1, DynamicImage::ImageLuma8(GrayImage::new(1, 1)), &doc);
        drop(doc);
        assert!(page.origin().is_none());
    }

    #[test]
    fn load_image_page_decodes_png() {
        let f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        GrayImage::from_pixel(8, 5, Luma([200u8])).save(f.path()).unwrap();
        let doc = Arc::new(SourceDocument::inspect(f.path(), u64::MAX).unwrap());

        let page = load_image_page(&doc).unwrap();
        assert_eq!(page.page_num(), 1);
        assert_eq!((page.width(), page.height()), (8, 5));
    }

    #[test]
    fn load_image_page_rejects_garbage() {
        use std::io::Write;
        let mut f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        f.write_all(b"not really a png").unwrap();
        let doc = Arc::new(SourceDocument::inspect(f.path(), u64::MAX).unwrap());

        let err = load_image_page(&doc).unwrap_err();
        assert!(matches!(err, IngestError::ConversionError { .. }));
    }

    #[test]
    fn password_protected_open_fails_as_document_error() {
        use std::io::Write;
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"%PDF-1.7\n%%EOF garbage").unwrap();
        let doc = Arc::new(SourceDocument::inspect(f.path(), u64::MAX).unwrap());
        let rasterizer = PdfiumRasterizer::new(Some("s3cret".into()), 2000);

        // Without libpdfium on the host the bind step fails instead.
        match rasterizer.rasterize(&doc, 150) {
            Err(IngestError::ConversionError { .. })
            | Err(IngestError::PasswordRequired { .. })
            | Err(IngestError::PdfiumBindingFailed(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(pages) => panic!("garbage decoded to {} page(s)", pages.len()),
        }
    }
}
