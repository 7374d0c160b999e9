//! Input validation: turn a user-supplied path into a [`SourceDocument`].
//!
//! Every check here is answered from a single `stat` call and the file
//! name, so oversized or unsupported inputs are rejected before any byte of
//! content is read. Checks run in a fixed order: existence, size, extension.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions decoded as standalone raster images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp"];

/// Declared format of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Paginated PDF; may carry a native text layer.
    Pdf,
    /// Single raster image (scan or photograph of one page).
    Image,
}

impl DocumentFormat {
    /// Classify a lower-cased extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext == "pdf" {
            Some(DocumentFormat::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(DocumentFormat::Image)
        } else {
            None
        }
    }
}

/// Identity of the document being processed. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    path: PathBuf,
    size_bytes: u64,
    format: DocumentFormat,
    extension: String,
}

impl SourceDocument {
    /// Validate `path` against `max_bytes` and classify it.
    ///
    /// # Errors
    /// - [`IngestError::NotFound`] if the path is missing or not a regular file
    /// - [`IngestError::SizeLimitExceeded`] if the file is larger than `max_bytes`
    /// - [`IngestError::UnsupportedFormat`] if the extension is not supported
    pub fn inspect(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, IngestError> {
        let path = path.as_ref().to_path_buf();

        let meta = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(IngestError::NotFound { path }),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(IngestError::PermissionDenied { path });
            }
            Err(_) => return Err(IngestError::NotFound { path }),
        };

        let size_bytes = meta.len();
        if size_bytes > max_bytes {
            return Err(IngestError::SizeLimitExceeded {
                path,
                size_bytes,
                limit_bytes: max_bytes,
            });
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let format = DocumentFormat::from_extension(&extension).ok_or_else(|| {
            IngestError::UnsupportedFormat {
                path: path.clone(),
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{extension}")
                },
            }
        })?;

        debug!(
            "Accepted {:?} document {} ({} bytes)",
            format,
            path.display(),
            size_bytes
        );

        Ok(Self {
            path,
            size_bytes,
            format,
            extension,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// File name without directories, lossily converted to UTF-8.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lower-cased extension including the dot, e.g. `.pdf`.
    pub fn file_type(&self) -> String {
        format!(".{}", self.extension)
    }

    /// Size in MiB rounded to two decimals.
    pub fn size_mb(&self) -> f64 {
        let mb = self.size_bytes as f64 / crate::config::BYTES_PER_MB as f64;
        (mb * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(suffix: &str, len: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(&vec![b'x'; len]).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn classifies_extensions() {
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("jpeg"), Some(DocumentFormat::Image));
        assert_eq!(DocumentFormat::from_extension("tif"), Some(DocumentFormat::Image));
        assert_eq!(DocumentFormat::from_extension("docx"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = SourceDocument::inspect("/definitely/not/here.pdf", 1024).unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[test]
    fn directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceDocument::inspect(dir.path(), 1024).unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[test]
    fn size_boundary_is_inclusive() {
        let f = file_with(".pdf", 64);
        let doc = SourceDocument::inspect(f.path(), 64).unwrap();
        assert_eq!(doc.size_bytes(), 64);

        let err = SourceDocument::inspect(f.path(), 63).unwrap_err();
        match err {
            IngestError::SizeLimitExceeded {
                size_bytes,
                limit_bytes,
                ..
            } => {
                assert_eq!(size_bytes, 64);
                assert_eq!(limit_bytes, 63);
            }
            other => panic!("expected SizeLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_extension_rejected() {
        let f = file_with(".docx", 10);
        let err = SourceDocument::inspect(f.path(), 1024).unwrap_err();
        match err {
            IngestError::UnsupportedFormat { extension, .. } => assert_eq!(extension, ".docx"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn uppercase_extension_accepted() {
        let f = file_with(".PNG", 10);
        let doc = SourceDocument::inspect(f.path(), 1024).unwrap();
        assert_eq!(doc.format(), DocumentFormat::Image);
        assert_eq!(doc.file_type(), ".png");
    }

    #[test]
    fn size_mb_rounds_to_two_decimals() {
        let f = file_with(".pdf", 1_572_864); // 1.5 MiB
        let doc = SourceDocument::inspect(f.path(), u64::MAX).unwrap();
        assert_eq!(doc.size_mb(), 1.5);
    }
}
