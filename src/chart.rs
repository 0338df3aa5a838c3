//! Circular sampling of the reference chart.
//!
//! The chart is assumed centered in the frame unless explicit circle
//! parameters are supplied: center (w/2, h/2), radius 0.4 x min(w, h), i.e.
//! the chart fills about 80% of the shorter image dimension. Samples are
//! taken at fixed angular steps with `x = cx + r*cos(theta)` and
//! `y = cy - r*sin(theta)` (image y-axis points down). Coordinates falling
//! outside the grid are clamped, never skipped, so the sampler always
//! yields exactly `sample_count` samples in ascending angle order.

use crate::color::{hue_to_wavelength, reference_patches, rgb_to_hsv, RgbColor};
use crate::image_source::PixelGrid;
use crate::types::{BoundingBox, ColorRegion, CornerSample, Point, ShadowBaseline, WavelengthSample};

/// Circle parameters locating the chart within an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartCircle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

impl ChartCircle {
    /// The assumed position when no detection is available: centered, with
    /// radius 0.4 x the shorter dimension.
    pub fn assumed(width: u32, height: u32) -> Self {
        Self {
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            radius: 0.4 * width.min(height) as f64,
        }
    }
}

/// Nominal hue of each chart patch, used to group samples into regions.
const PATCH_HUES: [f64; 6] = [0.0, 60.0, 120.0, 180.0, 240.0, 300.0];

/// Samples rejected from region grouping below these thresholds
/// (desaturated or near-black pixels carry no usable hue).
const MIN_SATURATION_PCT: f64 = 15.0;
const MIN_VALUE_PCT: f64 = 10.0;

/// Hue distance beyond which a sample belongs to no patch.
const PATCH_HUE_TOLERANCE: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct ChartSampler {
    sample_count: usize,
    radius_fraction: f64,
}

impl ChartSampler {
    pub fn new(sample_count: usize, radius_fraction: f64) -> Self {
        Self {
            sample_count: sample_count.max(1),
            radius_fraction: radius_fraction.clamp(0.05, 1.0),
        }
    }

    /// Calibration-style sampling: full chart radius.
    pub fn for_calibration(sample_count: usize) -> Self {
        Self::new(sample_count, 1.0)
    }

    /// Sample the chart circle at fixed angular steps. Deterministic for a
    /// given grid and circle; results are ordered by ascending angle.
    pub fn sample(&self, grid: &PixelGrid, circle: Option<ChartCircle>) -> Vec<WavelengthSample> {
        let circle = circle.unwrap_or_else(|| ChartCircle::assumed(grid.width(), grid.height()));
        let radius = circle.radius * self.radius_fraction;
        let step = 360.0 / self.sample_count as f64;

        (0..self.sample_count)
            .map(|i| {
                let angle_deg = i as f64 * step;
                let (x, y) = point_on_circle(&circle, radius, angle_deg);
                let rgb = average_window(grid, x, y, window_half(radius));
                let hsv = rgb_to_hsv(rgb);
                WavelengthSample {
                    angle_deg,
                    rgb,
                    hsv,
                    wavelength_nm: hue_to_wavelength(hsv.hue),
                    intensity: rgb.intensity(),
                }
            })
            .collect()
    }

    /// Group samples into chart-patch regions by hue proximity. Only
    /// sufficiently saturated and bright samples participate; a patch with
    /// no members produces no region.
    pub fn group_regions(
        &self,
        samples: &[WavelengthSample],
        circle: &ChartCircle,
    ) -> Vec<ColorRegion> {
        let radius = circle.radius * self.radius_fraction;
        let patches = reference_patches();
        let mut members: Vec<Vec<&WavelengthSample>> = vec![Vec::new(); patches.len()];

        for sample in samples {
            if sample.hsv.saturation < MIN_SATURATION_PCT || sample.hsv.value < MIN_VALUE_PCT {
                continue;
            }
            let (idx, dist) = nearest_patch_hue(sample.hsv.hue);
            if dist <= PATCH_HUE_TOLERANCE {
                members[idx].push(sample);
            }
        }

        patches
            .iter()
            .zip(members)
            .filter(|(_, m)| !m.is_empty())
            .map(|(patch, m)| {
                let n = m.len() as f64;
                let (mut r, mut g, mut b) = (0.0, 0.0, 0.0);
                let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
                let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
                let (mut sum_x, mut sum_y) = (0.0, 0.0);

                for s in &m {
                    r += s.rgb.r as f64;
                    g += s.rgb.g as f64;
                    b += s.rgb.b as f64;
                    let (x, y) = point_on_circle(circle, radius, s.angle_deg);
                    sum_x += x;
                    sum_y += y;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }

                ColorRegion {
                    label: patch.name.to_string(),
                    wavelength: patch.wavelength_nm,
                    rgb: RgbColor::from_f64(r / n, g / n, b / n),
                    center: Point {
                        x: (sum_x / n).round().max(0.0) as u32,
                        y: (sum_y / n).round().max(0.0) as u32,
                    },
                    area: m.len() as u32,
                    bbox: BoundingBox {
                        x: min_x.floor().max(0.0) as u32,
                        y: min_y.floor().max(0.0) as u32,
                        width: (max_x - min_x).ceil().max(1.0) as u32,
                        height: (max_y - min_y).ceil().max(1.0) as u32,
                    },
                }
            })
            .collect()
    }
}

/// Fraction of each image dimension covered by a corner baseline patch.
const CORNER_FRACTION: f64 = 0.1;

/// Sample the four image corners and average them into a shadow baseline.
/// The corners sit outside the chart circle, so their brightness tracks the
/// ambient shadow level of the shot rather than any patch color.
pub fn corner_baseline(grid: &PixelGrid) -> ShadowBaseline {
    let cw = ((grid.width() as f64 * CORNER_FRACTION).round() as u32)
        .clamp(1, grid.width());
    let ch = ((grid.height() as f64 * CORNER_FRACTION).round() as u32)
        .clamp(1, grid.height());
    let right = grid.width() - cw;
    let bottom = grid.height() - ch;

    let origins: [(&str, u32, u32); 4] = [
        ("top_left", 0, 0),
        ("top_right", right, 0),
        ("bottom_left", 0, bottom),
        ("bottom_right", right, bottom),
    ];

    let corners: Vec<CornerSample> = origins
        .iter()
        .map(|&(label, x0, y0)| {
            let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
            for y in y0..y0 + ch {
                for x in x0..x0 + cw {
                    let px = grid.get_clamped(x as i64, y as i64);
                    r += px.r as u64;
                    g += px.g as u64;
                    b += px.b as u64;
                }
            }
            let n = (cw as u64 * ch as u64) as f64;
            CornerSample {
                corner: label.to_string(),
                rgb: RgbColor::from_f64(r as f64 / n, g as f64 / n, b as f64 / n),
                bbox: BoundingBox { x: x0, y: y0, width: cw, height: ch },
            }
        })
        .collect();

    let brightness =
        corners.iter().map(|c| c.rgb.brightness()).sum::<f64>() / corners.len() as f64;
    ShadowBaseline { corners, brightness }
}

fn point_on_circle(circle: &ChartCircle, radius: f64, angle_deg: f64) -> (f64, f64) {
    let theta = angle_deg.to_radians();
    (circle.cx + radius * theta.cos(), circle.cy - radius * theta.sin())
}

/// Averaging window half-side, scaled with the sampling radius so large
/// images smooth over sensor noise the way small ones do.
fn window_half(radius: f64) -> i64 {
    ((radius / 32.0).floor() as i64).max(1)
}

fn average_window(grid: &PixelGrid, x: f64, y: f64, half: i64) -> RgbColor {
    let cx = x.round() as i64;
    let cy = y.round() as i64;
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    let mut count = 0u64;

    for dy in -half..=half {
        for dx in -half..=half {
            let px = grid.get_clamped(cx + dx, cy + dy);
            r += px.r as u64;
            g += px.g as u64;
            b += px.b as u64;
            count += 1;
        }
    }

    RgbColor::from_f64(
        r as f64 / count as f64,
        g as f64 / count as f64,
        b as f64 / count as f64,
    )
}

fn nearest_patch_hue(hue: f64) -> (usize, f64) {
    let mut best = (0, f64::MAX);
    for (i, patch_hue) in PATCH_HUES.iter().enumerate() {
        let raw = (hue - patch_hue).abs().rem_euclid(360.0);
        let dist = raw.min(360.0 - raw);
        if dist < best.1 {
            best = (i, dist);
        }
    }
    best
}
