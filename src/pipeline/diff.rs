//! Pixel-level luminance diff between two raster pages.
//!
//! Both pages are compared over their common top-left region
//! (`min(w1, w2) × min(h1, h2)`); anything outside it is ignored rather than
//! treated as an error. Each pixel pair is reduced to BT.601 luma and flagged
//! when the absolute difference exceeds the threshold.
//!
//! Luma is computed in fixed point (weights × 1000) so the `> threshold`
//! boundary is exact: a gray-level gap of 51 is always flagged and a gap of
//! 50 never is, with no float rounding in between.

use crate::config::AnalysisConfig;
use crate::error::LabelScanError;
use crate::pipeline::render::RasterPage;
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Colour written for flagged pixels.
pub const FLAG_COLOUR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Colour written for unflagged pixels (alpha 0 = no difference).
pub const CLEAR_COLOUR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// ITU-R BT.601 luma weights scaled by 1000.
const LUMA_R: u32 = 299;
const LUMA_G: u32 = 587;
const LUMA_B: u32 = 114;

/// A binary difference mask.
///
/// Every pixel is either [`FLAG_COLOUR`] (alpha 255) or [`CLEAR_COLOUR`]
/// (alpha 0).
#[derive(Debug, Clone, PartialEq)]
pub struct DiffMask {
    image: RgbaImage,
    flagged: usize,
}

impl DiffMask {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Number of flagged pixels.
    pub fn flagged_count(&self) -> usize {
        self.flagged
    }

    /// Share of compared pixels that were flagged, in `[0, 1]`.
    pub fn flagged_ratio(&self) -> f64 {
        let total = self.width() as usize * self.height() as usize;
        if total == 0 {
            0.0
        } else {
            self.flagged as f64 / total as f64
        }
    }

    /// True when no pixel was flagged.
    pub fn is_empty(&self) -> bool {
        self.flagged == 0
    }

    /// Whether the pixel at `(x, y)` is flagged. Out-of-bounds reads as false.
    pub fn is_flagged(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.image.get_pixel(x, y)[3] == 255
    }

    /// Encode as PNG (transparency preserved).
    pub fn to_png(&self) -> Result<Vec<u8>, LabelScanError> {
        crate::pipeline::encode::png_bytes(&self.image)
    }
}

/// Luma × 1000 of an RGB triple.
#[inline]
pub fn luminance_milli(r: u8, g: u8, b: u8) -> u32 {
    LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32
}

/// Luma in `[0, 255]` of an RGB triple.
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    luminance_milli(r, g, b) as f64 / 1000.0
}

/// Diff two pages with the default threshold of 50.
pub fn diff(a: &RasterPage, b: &RasterPage) -> DiffMask {
    diff_with_threshold(a, b, crate::config::DEFAULT_DIFF_THRESHOLD)
}

/// Diff two pages, flagging pixels whose luma differs by more than `threshold`.
pub fn diff_with_threshold(a: &RasterPage, b: &RasterPage, threshold: u8) -> DiffMask {
    diff_images(a.image(), b.image(), threshold)
}

/// Diff two pages at `config.diff_threshold`.
pub fn diff_with_config(a: &RasterPage, b: &RasterPage, config: &AnalysisConfig) -> DiffMask {
    diff_with_threshold(a, b, config.diff_threshold)
}

/// Diff two RGBA images over their common region.
pub fn diff_images(a: &RgbaImage, b: &RgbaImage, threshold: u8) -> DiffMask {
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());
    let limit = threshold as u32 * 1000;

    let mut mask = RgbaImage::from_pixel(width, height, CLEAR_COLOUR);
    let mut flagged = 0usize;

    let row_len = width as usize * 4;
    let stride_a = a.width() as usize * 4;
    let stride_b = b.width() as usize * 4;
    let (raw_a, raw_b) = (a.as_raw(), b.as_raw());

    for (y, out_row) in mask.chunks_exact_mut(row_len.max(1)).enumerate() {
        if row_len == 0 {
            break;
        }
        let row_a = &raw_a[y * stride_a..y * stride_a + row_len];
        let row_b = &raw_b[y * stride_b..y * stride_b + row_len];

        for ((pa, pb), out) in row_a
            .chunks_exact(4)
            .zip(row_b.chunks_exact(4))
            .zip(out_row.chunks_exact_mut(4))
        {
            let la = luminance_milli(pa[0], pa[1], pa[2]);
            let lb = luminance_milli(pb[0], pb[1], pb[2]);
            if la.abs_diff(lb) > limit {
                out.copy_from_slice(&FLAG_COLOUR.0);
                flagged += 1;
            }
        }
    }

    debug!(
        "Diff {}x{} (inputs {}x{} / {}x{}): {} flagged",
        width,
        height,
        a.width(),
        a.height(),
        b.width(),
        b.height(),
        flagged
    );

    DiffMask {
        image: mask,
        flagged,
    }
}
