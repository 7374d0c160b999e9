//! Page normalisation ahead of recognition.
//!
//! Steps, in order:
//!
//! 1. rotate by the detected [`Rotation`] (skipped entirely for 0°)
//! 2. convert to 8-bit grayscale
//! 3. non-local-means denoise
//! 4. Gaussian adaptive threshold to a strictly binary image
//!
//! Every step returns a new buffer; the input [`PageImage`] is never touched.

use crate::config::NormalizeSettings;
use crate::error::PageError;
use crate::pipeline::orientation::Rotation;
use crate::pipeline::render::PageImage;
use image::{DynamicImage, GrayImage, Luma};
use std::borrow::Cow;
use tracing::trace;

/// Weights below this are treated as zero by the denoiser.
const MIN_WEIGHT: f32 = 0.001;

/// Rotate, grayscale, denoise and binarise `page`.
pub fn normalize(
    page: &PageImage,
    rotation: Rotation,
    settings: &NormalizeSettings,
) -> Result<PageImage, PageError> {
    if page.width() == 0 || page.height() == 0 {
        return Err(PageError::Preprocess {
            page: page.page_num(),
            detail: format!("empty image {}x{}", page.width(), page.height()),
        });
    }

    let upright = rotate(page.image(), rotation);
    let gray = upright.to_luma8();

    let cleaned = if settings.denoise {
        denoise_nl_means(
            &gray,
            settings.denoise_strength,
            settings.template_window,
            settings.search_window,
        )
    } else {
        gray
    };

    let binary = adaptive_threshold_gaussian(
        &cleaned,
        settings.threshold_block_size,
        settings.threshold_offset,
    );
    trace!(
        "Page {}: normalised to {}x{} binary",
        page.page_num(),
        binary.width(),
        binary.height()
    );
    Ok(page.derive(DynamicImage::ImageLuma8(binary)))
}

/// Rotate clockwise by `rotation`, expanding the canvas. Borrows for 0°.
pub fn rotate(image: &DynamicImage, rotation: Rotation) -> Cow<'_, DynamicImage> {
    match rotation {
        Rotation::None => Cow::Borrowed(image),
        Rotation::Cw90 => Cow::Owned(image.rotate90()),
        Rotation::Cw180 => Cow::Owned(image.rotate180()),
        Rotation::Cw270 => Cow::Owned(image.rotate270()),
    }
}

/// Non-local-means denoising of a grayscale image.
///
/// Each output pixel is a weighted mean of the pixels in a
/// `search_window`² neighbourhood, weighted by `exp(-d / h²)` where `d` is
/// the mean squared difference between the `template_window`² patches around
/// the two pixels. Patch distances for a fixed displacement are read from a
/// summed-area table, so the cost per pixel does not depend on the template
/// size. Borders replicate the edge pixel.
///
/// Cost is `search_window²` passes over the page: with the default 21×21
/// search a 300 DPI letter page takes tens of seconds in a release build.
/// Lower `dpi`, shrink `search_window`, or raise `page_timeout_secs` for
/// large batches.
pub fn denoise_nl_means(src: &GrayImage, h: f32, template_window: u32, search_window: u32) -> GrayImage {
    let (w, hgt) = src.dimensions();
    if w == 0 || hgt == 0 {
        return src.clone();
    }
    let (w, hgt) = (w as usize, hgt as usize);

    let tr = (template_window / 2) as usize;
    let sr = (search_window / 2) as usize;
    let patch_area = ((2 * tr + 1) * (2 * tr + 1)) as u64;

    // Edge-replicated copy wide enough for any patch at any displacement.
    let pad = tr + sr;
    let bw = w + 2 * pad;
    let bh = hgt + 2 * pad;
    let data = src.as_raw();
    let mut padded = vec![0i32; bw * bh];
    for by in 0..bh {
        let sy = by.saturating_sub(pad).min(hgt - 1);
        for bx in 0..bw {
            let sx = bx.saturating_sub(pad).min(w - 1);
            padded[by * bw + bx] = data[sy * w + sx] as i32;
        }
    }

    // exp(-d / h²) for every possible mean squared distance of u8 pixels;
    // distances past `cutoff` weigh nothing.
    let h2 = (h as f64) * (h as f64);
    let cutoff = ((h2 * (1.0 / MIN_WEIGHT as f64).ln()).floor() as u64).min(255 * 255);
    let lut: Vec<f32> = (0..=cutoff)
        .map(|d| {
            let wgt = (-(d as f64) / h2).exp() as f32;
            if wgt < MIN_WEIGHT {
                0.0
            } else {
                wgt
            }
        })
        .collect();

    // Squared differences are needed for every pixel a patch can touch.
    let pw = w + 2 * tr;
    let ph = hgt + 2 * tr;
    let stride = pw + 1;
    let mut sat = vec![0u64; stride * (ph + 1)];
    let span = 2 * tr + 1;

    let n = w * hgt;
    let mut weight_sum = vec![0f32; n];
    let mut value_sum = vec![0f32; n];

    for dy in 0..=2 * sr {
        for dx in 0..=2 * sr {
            // Patch-row origin `sr` in the padded buffer; neighbour shifted
            // by (dx - sr, dy - sr).
            for v in 0..ph {
                let base = (v + sr) * bw + sr;
                let shifted = (v + dy) * bw + dx;
                let mut row = 0u64;
                for u in 0..pw {
                    let diff = padded[base + u] - padded[shifted + u];
                    row += (diff * diff) as u64;
                    sat[(v + 1) * stride + u + 1] = sat[v * stride + u + 1] + row;
                }
            }

            for y in 0..hgt {
                let neighbour_row = (y + tr + dy) * bw + tr + dx;
                for x in 0..w {
                    let ssd = sat[(y + span) * stride + x + span] + sat[y * stride + x]
                        - sat[y * stride + x + span]
                        - sat[(y + span) * stride + x];
                    let d = ssd / patch_area;
                    if d > cutoff {
                        continue;
                    }
                    let wgt = lut[d as usize];
                    if wgt == 0.0 {
                        continue;
                    }
                    let i = y * w + x;
                    weight_sum[i] += wgt;
                    value_sum[i] += wgt * padded[neighbour_row + x] as f32;
                }
            }
        }
    }

    let mut out = GrayImage::new(w as u32, hgt as u32);
    for (i, px) in out.pixels_mut().enumerate() {
        // The zero displacement always contributes weight 1.
        let v = value_sum[i] / weight_sum[i];
        *px = Luma([v.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

/// Binarise with a Gaussian-weighted local mean.
///
/// A pixel becomes 255 when it is brighter than the Gaussian mean of its
/// `block_size`² neighbourhood minus `offset`, otherwise 0. σ is derived
/// from the block size as `0.3·((block_size − 1)·0.5 − 1) + 0.8`.
pub fn adaptive_threshold_gaussian(src: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = imageproc::filter::gaussian_blur_f32(src, sigma);

    let mut out = GrayImage::new(src.width(), src.height());
    for ((dst, s), m) in out.pixels_mut().zip(src.pixels()).zip(local_mean.pixels()) {
        let on = (s[0] as i32) > (m[0] as i32) - offset;
        *dst = Luma([if on { 255 } else { 0 }]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(img: GrayImage) -> PageImage {
        PageImage::detached(1, DynamicImage::ImageLuma8(img))
    }

    fn fast() -> NormalizeSettings {
        NormalizeSettings {
            search_window: 7,
            template_window: 3,
            ..NormalizeSettings::default()
        }
    }

    fn document_like(w: u32, h: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([235]));
        for y in (h / 3)..(h / 3 + 3) {
            for x in 4..w - 4 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        img
    }

    /// Direct per-pixel patch comparison with clamped borders.
    fn nl_means_reference(src: &GrayImage, h: f32, template: u32, search: u32) -> GrayImage {
        let (w, hgt) = (src.width() as i64, src.height() as i64);
        let px = |x: i64, y: i64| src.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, hgt - 1) as u32)[0] as i64;
        let (tr, sr) = ((template / 2) as i64, (search / 2) as i64);
        let area = ((2 * tr + 1) * (2 * tr + 1)) as u64;
        let h2 = (h as f64) * (h as f64);

        let mut out = GrayImage::new(w as u32, hgt as u32);
        for y in 0..hgt {
            for x in 0..w {
                let (mut ws, mut vs) = (0f32, 0f32);
                for dy in -sr..=sr {
                    for dx in -sr..=sr {
                        let mut ssd = 0u64;
                        for ty in -tr..=tr {
                            for tx in -tr..=tr {
                                let diff = px(x + tx, y + ty) - px(x + dx + tx, y + dy + ty);
                                ssd += (diff * diff) as u64;
                            }
                        }
                        let wgt = (-((ssd / area) as f64) / h2).exp() as f32;
                        if wgt >= MIN_WEIGHT {
                            ws += wgt;
                            vs += wgt * px(x + dx, y + dy) as f32;
                        }
                    }
                }
                out.put_pixel(x as u32, y as u32, Luma([(vs / ws).round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }

    #[test]
    fn nl_means_matches_direct_patch_comparison() {
        let mut img = document_like(23, 17);
        for (i, p) in img.pixels_mut().enumerate() {
            // Deterministic grain so many patch distances are non-zero.
            p[0] = p[0].saturating_add(((i * 37) % 11) as u8);
        }
        img.put_pixel(0, 0, Luma([90]));
        img.put_pixel(22, 16, Luma([160]));

        let fast = denoise_nl_means(&img, 10.0, 3, 7);
        let direct = nl_means_reference(&img, 10.0, 3, 7);
        for (a, b) in fast.pixels().zip(direct.pixels()) {
            assert!((a[0] as i32 - b[0] as i32).abs() <= 1, "{} vs {}", a[0], b[0]);
        }
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let p = page(GrayImage::new(40, 20));
        let out = normalize(&p, Rotation::Cw90, &fast()).unwrap();
        assert_eq!((out.width(), out.height()), (20, 40));
        let out = normalize(&p, Rotation::Cw180, &fast()).unwrap();
        assert_eq!((out.width(), out.height()), (40, 20));
    }

    #[test]
    fn zero_rotation_borrows() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(3, 3));
        assert!(matches!(rotate(&img, Rotation::None), Cow::Borrowed(_)));
        assert!(matches!(rotate(&img, Rotation::Cw270), Cow::Owned(_)));
    }

    #[test]
    fn output_is_strictly_binary() {
        let p = page(document_like(48, 32));
        let out = normalize(&p, Rotation::None, &fast()).unwrap();
        let gray = out.image().to_luma8();
        assert!(gray.pixels().all(|px| px[0] == 0 || px[0] == 255));
        assert!(gray.pixels().any(|px| px[0] == 0));
    }

    #[test]
    fn input_page_is_not_mutated() {
        let p = page(document_like(32, 24));
        let before = p.image().to_luma8();
        let _ = normalize(&p, Rotation::Cw90, &fast()).unwrap();
        assert_eq!(p.image().to_luma8(), before);
        assert_eq!(p.page_num(), 1);
    }

    #[test]
    fn uniform_page_stays_white() {
        let p = page(GrayImage::from_pixel(16, 16, Luma([180])));
        let out = normalize(&p, Rotation::None, &fast()).unwrap();
        assert!(out.image().to_luma8().pixels().all(|px| px[0] == 255));
    }

    #[test]
    fn empty_image_is_a_preprocess_error() {
        let p = page(GrayImage::new(0, 0));
        let err = normalize(&p, Rotation::None, &fast()).unwrap_err();
        assert!(matches!(err, PageError::Preprocess { page: 1, .. }));
    }

    #[test]
    fn denoise_pulls_faint_speck_toward_background() {
        let mut img = GrayImage::from_pixel(15, 15, Luma([128]));
        img.put_pixel(7, 7, Luma([140]));
        let out = denoise_nl_means(&img, 10.0, 3, 7);
        assert!(out.get_pixel(7, 7)[0] < 132);
        assert_eq!(out.get_pixel(0, 0)[0], 128);
    }

    #[test]
    fn denoise_preserves_high_contrast_edges() {
        let img = document_like(24, 24);
        let out = denoise_nl_means(&img, 10.0, 3, 7);
        assert!(out.get_pixel(12, 9)[0] < 60);
        assert!(out.get_pixel(12, 20)[0] > 200);
    }

    #[test]
    fn denoise_keeps_uniform_image() {
        let img = GrayImage::from_pixel(9, 9, Luma([77]));
        assert_eq!(denoise_nl_means(&img, 10.0, 7, 21), img);
    }

    #[test]
    fn threshold_separates_stroke_from_background() {
        let img = document_like(40, 30);
        let out = adaptive_threshold_gaussian(&img, 11, 2);
        assert_eq!(out.get_pixel(20, 11)[0], 0);
        assert_eq!(out.get_pixel(20, 25)[0], 255);
    }
}
