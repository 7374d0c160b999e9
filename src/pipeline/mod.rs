//! Pipeline stages for document ingestion.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own; the strategist in [`crate::extract`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//!                   ┌──▶ text_layer ──(enough text)──────────────────────┐
//! input ──(pdf)─────┤                                                    ├──▶ assemble
//!   │               └──(too little)──▶ render ──┐                        │
//!   └──(image)────────────────────────▶ render ─┴─▶ orientation ──▶ normalize ──▶ ocr
//! ```
//!
//! 1. [`input`]: validate existence, size and extension from one `stat`
//! 2. [`text_layer`]: read the embedded text of a PDF and judge whether it
//!    is substantial enough to skip OCR
//! 3. [`render`]: rasterise PDF pages (pdfium) or decode a standalone image;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 4. [`orientation`]: engine OSD first, Hough line angles as fallback
//! 5. [`normalize`]: rotate, grayscale, denoise, adaptive threshold
//! 6. [`ocr`]: recognise the normalised page; [`encode`] hands the image to
//!    the engine process
//! 7. [`assemble`]: page banners, error markers, metadata

pub mod assemble;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod orientation;
pub mod render;
pub mod text_layer;
