//! Per-frame feature extraction
//!
//! Every feature is derived from a single frame; nothing is carried between
//! frames here.

use crate::config::ThresholdConfig;
use crate::video::Frame;
use serde::{Deserialize, Serialize};

/// Features computed from one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Share of pixels inside the orange HSV band, 0-100
    pub orange_area_percent: f64,
    /// Share of pixels with every channel below the dark threshold, 0-100
    pub dark_pixel_percent: f64,
    /// Mean row of orange pixels divided by frame height; `None` without orange pixels
    pub orange_row_centroid: Option<f64>,
    /// Orange pixel count divided by frame width. Not bounded by 100.
    pub orange_column_coverage: f64,
}

impl FeatureSet {
    /// Compute features for `frame`. A zero-area frame yields all zeros.
    pub fn extract(frame: &Frame, thresholds: &ThresholdConfig) -> Self {
        let width = frame.width();
        let total = frame.pixel_count();
        if total == 0 {
            return FeatureSet::default();
        }

        let mut orange = 0usize;
        let mut orange_row_sum = 0usize;
        let mut dark = 0usize;

        for (row, line) in frame.pixels.outer_iter().enumerate() {
            for px in line.outer_iter() {
                let (r, g, b) = (px[0], px[1], px[2]);
                if is_dark(r, g, b, thresholds.dark_channel_max) {
                    dark += 1;
                }
                if in_band(
                    rgb_to_hsv(r, g, b),
                    thresholds.orange_hsv_lower,
                    thresholds.orange_hsv_upper,
                ) {
                    orange += 1;
                    orange_row_sum += row;
                }
            }
        }

        let height = frame.height() as f64;
        FeatureSet {
            orange_area_percent: orange as f64 / total as f64 * 100.0,
            dark_pixel_percent: dark as f64 / total as f64 * 100.0,
            orange_row_centroid: (orange > 0)
                .then(|| orange_row_sum as f64 / orange as f64 / height),
            orange_column_coverage: orange as f64 / width as f64,
        }
    }
}

fn is_dark(r: u8, g: u8, b: u8, max: u8) -> bool {
    r < max && g < max && b < max
}

fn in_band(hsv: [u8; 3], lower: [u8; 3], upper: [u8; 3]) -> bool {
    (0..3).all(|i| hsv[i] >= lower[i] && hsv[i] <= upper[i])
}

/// Convert RGB to 8-bit HSV: hue in degrees / 2 (0-179), saturation and value 0-255
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let hue = ((h / 2.0).round() as u16 % 180) as u8;
    [hue, s.round() as u8, max as u8]
}
