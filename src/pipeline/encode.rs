//! Image hand-off to the external recognition engine.
//!
//! The engine runs as a separate process and reads its input from disk, so
//! each page is written to a private temporary PNG. PNG keeps the binarised
//! strokes exact. The file is removed when the returned handle is dropped.

use image::DynamicImage;
use std::io::{BufWriter, Write};
use tempfile::NamedTempFile;
use tracing::trace;

/// Write `img` to a fresh temporary `.png` file.
pub fn write_temp_png(img: &DynamicImage) -> Result<NamedTempFile, image::ImageError> {
    let file = tempfile::Builder::new()
        .prefix("legal-ingest-page-")
        .suffix(".png")
        .tempfile()
        .map_err(image::ImageError::IoError)?;

    {
        let mut writer = BufWriter::new(file.as_file());
        img.write_to(&mut writer, image::ImageFormat::Png)?;
        writer.flush().map_err(image::ImageError::IoError)?;
    }

    trace!("Wrote {}x{} page to {}", img.width(), img.height(), file.path().display());
    Ok(file)
}
