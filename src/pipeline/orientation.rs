//! Page orientation detection as an ordered strategy chain.
//!
//! ## Chain
//!
//! [`OrientationChain`] holds strategies in priority order and stops at the
//! first one that returns `Ok`. The standard chain is:
//!
//! 1. [`OsdStrategy`]: the recognition engine's orientation and script
//!    detection, which reads the rotation off text shape and layout.
//! 2. [`HoughStrategy`]: a geometric fallback built on Canny edges and a
//!    straight-line Hough transform, reporting the median normal angle of
//!    the strongest lines.
//!
//! A strategy that errors or panics is skipped. If every strategy fails the
//! page is left as-is (0°).
//!
//! ## Fallback angle bins
//!
//! The median Hough angle θ (degrees, line normal) maps to a rotation as
//! follows. The bands are deliberately asymmetric and kept as found:
//!
//! | θ | rotation |
//! |---|----------|
//! | [45, 135) | 90° |
//! | [0, 45) ∪ [135, 180) | 0° |
//! | anything else | 270° |

use crate::config::OrientationSettings;
use crate::error::EngineError;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::PageImage;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// Clockwise rotation needed to bring a page upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// Already upright; normalisation skips the rotation step entirely.
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Parse a canonical angle. Anything but 0/90/180/270 is rejected.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn is_none(self) -> bool {
        self == Rotation::None
    }
}

/// Rotation decided for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrientationResult {
    pub rotation: Rotation,
    /// False only when the primary (first) strategy produced the result.
    pub from_fallback: bool,
}

/// One way of estimating a page's rotation.
pub trait OrientationStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn detect(&self, page: &PageImage) -> Result<Rotation, EngineError>;
}

/// Ordered list of strategies; the first success wins.
#[derive(Clone)]
pub struct OrientationChain {
    strategies: Vec<Arc<dyn OrientationStrategy>>,
}

impl std::fmt::Debug for OrientationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

impl OrientationChain {
    pub fn new(strategies: Vec<Arc<dyn OrientationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Engine OSD first, Hough line angles second.
    pub fn standard(engine: Arc<dyn OcrEngine>, settings: OrientationSettings) -> Self {
        Self::new(vec![
            Arc::new(OsdStrategy::new(engine)),
            Arc::new(HoughStrategy::new(settings)),
        ])
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run strategies in order until one succeeds. Never fails.
    pub fn detect(&self, page: &PageImage) -> OrientationResult {
        for (idx, strategy) in self.strategies.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| strategy.detect(page)));
            match outcome {
                Ok(Ok(rotation)) => {
                    debug!(
                        "Page {}: {} detected rotation {}°",
                        page.page_num(),
                        strategy.name(),
                        rotation.degrees()
                    );
                    return OrientationResult {
                        rotation,
                        from_fallback: idx > 0,
                    };
                }
                Ok(Err(e)) => {
                    debug!(
                        "Page {}: {} orientation failed, trying next: {}",
                        page.page_num(),
                        strategy.name(),
                        e
                    );
                }
                Err(_) => {
                    debug!(
                        "Page {}: {} orientation panicked, trying next",
                        page.page_num(),
                        strategy.name()
                    );
                }
            }
        }

        OrientationResult {
            rotation: Rotation::None,
            from_fallback: !self.strategies.is_empty(),
        }
    }
}

// ── Primary: engine OSD ──────────────────────────────────────────────────

/// Orientation from the recognition engine's script/orientation detector.
pub struct OsdStrategy {
    engine: Arc<dyn OcrEngine>,
}

impl OsdStrategy {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

impl OrientationStrategy for OsdStrategy {
    fn name(&self) -> &'static str {
        "osd"
    }

    fn detect(&self, page: &PageImage) -> Result<Rotation, EngineError> {
        let degrees = self.engine.detect_orientation(page.image())?;
        Rotation::from_degrees(degrees).ok_or_else(|| {
            EngineError::UnparsableOutput(format!("non-canonical rotation {degrees}°"))
        })
    }
}

// ── Fallback: Hough line angles ──────────────────────────────────────────

/// Orientation from the median normal angle of the strongest straight lines.
pub struct HoughStrategy {
    settings: OrientationSettings,
}

impl HoughStrategy {
    pub fn new(settings: OrientationSettings) -> Self {
        Self { settings }
    }
}

impl OrientationStrategy for HoughStrategy {
    fn name(&self) -> &'static str {
        "hough"
    }

    fn detect(&self, page: &PageImage) -> Result<Rotation, EngineError> {
        let gray = page.image().to_luma8();
        let edges = imageproc::edges::canny(&gray, self.settings.canny_low, self.settings.canny_high);
        let angles = strongest_line_angles(&edges, self.settings.vote_threshold, self.settings.top_k);

        let Some(theta) = median(&angles) else {
            debug!("Page {}: no lines detected, leaving upright", page.page_num());
            return Ok(Rotation::None);
        };

        debug!(
            "Page {}: median line angle {:.1}° over {} lines",
            page.page_num(),
            theta,
            angles.len()
        );
        Ok(classify_angle(theta))
    }
}

/// Map a median Hough normal angle onto a canonical rotation.
pub fn classify_angle(theta: f32) -> Rotation {
    if (45.0..135.0).contains(&theta) {
        Rotation::Cw90
    } else if (135.0..180.0).contains(&theta) || (0.0..45.0).contains(&theta) {
        Rotation::None
    } else {
        Rotation::Cw270
    }
}

/// Median of `values`; the mean of the two middle values for even lengths.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Standard Hough transform over a binary edge map.
///
/// Uses 1-pixel ρ and 1° θ resolution with θ ∈ [0°, 180°). A cell counts as
/// a line when its votes exceed `vote_threshold` and it is a local maximum
/// along both axes. Returns the θ of up to `top_k` lines, strongest first.
pub fn strongest_line_angles(edges: &GrayImage, vote_threshold: u32, top_k: usize) -> Vec<f32> {
    const THETA_BINS: usize = 180;

    let (width, height) = edges.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let diag = ((width as f64).hypot(height as f64)).ceil() as i64;
    let rho_bins = (2 * diag + 1) as usize;

    let trig: Vec<(f64, f64)> = (0..THETA_BINS)
        .map(|t| {
            let rad = (t as f64).to_radians();
            (rad.cos(), rad.sin())
        })
        .collect();

    let mut acc = vec![0u32; THETA_BINS * rho_bins];
    for (x, y, px) in edges.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        let (xf, yf) = (x as f64, y as f64);
        for (t, (cos, sin)) in trig.iter().enumerate() {
            let rho = (xf * cos + yf * sin).round() as i64 + diag;
            acc[t * rho_bins + rho as usize] += 1;
        }
    }

    let at = |t: usize, r: usize| acc[t * rho_bins + r];
    let mut lines: Vec<(u32, usize, usize)> = Vec::new();
    for t in 0..THETA_BINS {
        for r in 0..rho_bins {
            let votes = at(t, r);
            if votes <= vote_threshold {
                continue;
            }
            let left = if r > 0 { at(t, r - 1) } else { 0 };
            let right = if r + 1 < rho_bins { at(t, r + 1) } else { 0 };
            let up = if t > 0 { at(t - 1, r) } else { 0 };
            let down = if t + 1 < THETA_BINS { at(t + 1, r) } else { 0 };
            if votes > left && votes >= right && votes > up && votes >= down {
                lines.push((votes, t, r));
            }
        }
    }

    // Strongest first; ties broken by position so results are deterministic.
    lines.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    lines
        .into_iter()
        .take(top_k)
        .map(|(_, t, _)| t as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma};
    use imageproc::drawing::draw_line_segment_mut;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Result<Rotation, ()>, AtomicUsize);

    impl Fixed {
        fn ok(r: Rotation) -> Self {
            Fixed(Ok(r), AtomicUsize::new(0))
        }
        fn failing() -> Self {
            Fixed(Err(()), AtomicUsize::new(0))
        }
        fn calls(&self) -> usize {
            self.1.load(Ordering::SeqCst)
        }
    }

    impl OrientationStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn detect(&self, _page: &PageImage) -> Result<Rotation, EngineError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0
                .map_err(|_| EngineError::Unavailable("no osd data".into()))
        }
    }

    struct Panicking;

    impl OrientationStrategy for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn detect(&self, _page: &PageImage) -> Result<Rotation, EngineError> {
            panic!("detector blew up")
        }
    }

    fn blank_page(w: u32, h: u32) -> PageImage {
        PageImage::detached(1, DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([255]))))
    }

    /// White page with thick dark lines tilted 2° clockwise, i.e. a line
    /// normal of 92°.
    fn tilted_lines_page() -> PageImage {
        let (w, h) = (1200u32, 600u32);
        let mut img = GrayImage::from_pixel(w, h, Luma([255]));
        let drop = (w as f32 - 1.0) * 2f32.to_radians().tan();
        for y0 in [100.0f32, 200.0, 300.0, 400.0] {
            for dy in 0..5 {
                let y = y0 + dy as f32;
                draw_line_segment_mut(&mut img, (0.0, y), (w as f32 - 1.0, y + drop), Luma([0]));
            }
        }
        PageImage::detached(1, DynamicImage::ImageLuma8(img))
    }

    #[test]
    fn rotation_degrees_round_trip() {
        for d in [0, 90, 180, 270] {
            assert_eq!(Rotation::from_degrees(d).unwrap().degrees(), d);
        }
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(360), None);
        assert!(Rotation::default().is_none());
    }

    #[test]
    fn classify_angle_bins() {
        assert_eq!(classify_angle(0.0), Rotation::None);
        assert_eq!(classify_angle(44.9), Rotation::None);
        assert_eq!(classify_angle(45.0), Rotation::Cw90);
        assert_eq!(classify_angle(92.0), Rotation::Cw90);
        assert_eq!(classify_angle(134.9), Rotation::Cw90);
        assert_eq!(classify_angle(135.0), Rotation::None);
        assert_eq!(classify_angle(179.0), Rotation::None);
        assert_eq!(classify_angle(180.0), Rotation::Cw270);
        assert_eq!(classify_angle(-1.0), Rotation::Cw270);
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[93.0, 88.0, 92.0]), Some(92.0));
        assert_eq!(median(&[1.0, 3.0, 2.0, 4.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn hough_finds_no_lines_on_blank_page() {
        let edges = GrayImage::new(200, 100);
        assert!(strongest_line_angles(&edges, 200, 50).is_empty());
    }

    #[test]
    fn hough_reports_normal_angle_of_horizontal_line() {
        let mut edges = GrayImage::new(400, 50);
        for x in 0..400 {
            edges.put_pixel(x, 25, Luma([255]));
        }
        let angles = strongest_line_angles(&edges, 200, 50);
        assert_eq!(angles.first(), Some(&90.0));
    }

    #[test]
    fn hough_respects_top_k() {
        let mut edges = GrayImage::new(400, 100);
        for y in [10u32, 30, 50, 70, 90] {
            for x in 0..400 {
                edges.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(strongest_line_angles(&edges, 200, 2).len(), 2);
    }

    #[test]
    fn fallback_selects_90_for_92_degree_lines() {
        let chain = OrientationChain::new(vec![
            Arc::new(Fixed::failing()),
            Arc::new(HoughStrategy::new(OrientationSettings::default())),
        ]);
        let result = chain.detect(&tilted_lines_page());
        assert_eq!(result.rotation, Rotation::Cw90);
        assert!(result.from_fallback);
    }

    #[test]
    fn fallback_leaves_blank_page_upright() {
        let chain = OrientationChain::new(vec![
            Arc::new(Fixed::failing()),
            Arc::new(HoughStrategy::new(OrientationSettings::default())),
        ]);
        let result = chain.detect(&blank_page(300, 200));
        assert_eq!(result.rotation, Rotation::None);
        assert!(result.from_fallback);
    }

    #[test]
    fn chain_stops_at_first_success() {
        let primary = Arc::new(Fixed::ok(Rotation::Cw180));
        let secondary = Arc::new(Fixed::ok(Rotation::Cw90));
        let chain = OrientationChain::new(vec![primary.clone(), secondary.clone()]);

        let result = chain.detect(&blank_page(10, 10));
        assert_eq!(result.rotation, Rotation::Cw180);
        assert!(!result.from_fallback);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[test]
    fn all_failing_degrades_to_upright() {
        let chain = OrientationChain::new(vec![
            Arc::new(Fixed::failing()),
            Arc::new(Panicking),
        ]);
        let result = chain.detect(&blank_page(10, 10));
        assert_eq!(result.rotation, Rotation::None);
        assert!(result.from_fallback);
    }

    #[test]
    fn panicking_strategy_is_skipped() {
        let chain = OrientationChain::new(vec![
            Arc::new(Panicking),
            Arc::new(Fixed::ok(Rotation::Cw270)),
        ]);
        let result = chain.detect(&blank_page(10, 10));
        assert_eq!(result.rotation, Rotation::Cw270);
        assert!(result.from_fallback);
    }
}
