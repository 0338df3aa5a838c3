//! Per-wavelength correction factors derived from a calibrated chart photo.
//!
//! For each grid wavelength the factor is theoretical brightness over mean
//! observed brightness of the samples falling in a +/-20 nm window, clamped
//! to [0.1, 10] so a near-black observation can never amplify without
//! bound. Grid points with no matching samples stay at the no-op factor
//! 1.0. This is deliberate smoothing over a chart photo, not a regression.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::color::wavelength_to_rgb;
use crate::types::{CalibrationStatistics, WavelengthSample};

/// Wavelength grid: 380..=700 nm in 10 nm steps (33 points).
pub const GRID_MIN_NM: u32 = 380;
pub const GRID_MAX_NM: u32 = 700;
pub const GRID_STEP_NM: u32 = 10;

/// Samples within this distance of a grid point contribute to its factor.
const MATCH_WINDOW_NM: f64 = 20.0;

/// Safety clamp for correction factors.
const FACTOR_MIN: f64 = 0.1;
const FACTOR_MAX: f64 = 10.0;

/// Diagnostic intensity curves carried alongside the factor map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionCurves {
    pub wavelengths: Vec<u32>,
    /// Mean observed brightness per grid point, 0 where nothing matched.
    pub raw: Vec<f64>,
    /// Observed brightness normalized to [0, 1].
    pub normalized: Vec<f64>,
    /// Normalized brightness after the correction factor.
    pub corrected: Vec<f64>,
}

/// Immutable per-wavelength correction mapping. Derived once per
/// calibration image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionModel {
    /// Wavelength (nm) to clamped factor, ascending key order.
    factors: IndexMap<u32, f64>,
    /// Cubic fit of factor vs. scaled wavelength `t = (nm - 540) / 160`,
    /// ascending powers. Diagnostic only; absent when fewer than four grid
    /// points had matching samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polynomial: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curves: Option<CorrectionCurves>,
}

impl CorrectionModel {
    /// Derive factors from calibration samples spanning the visible range.
    pub fn derive(samples: &[WavelengthSample]) -> Self {
        Self::derive_with_baseline(samples, 0.0)
    }

    /// Derive factors with an ambient-shadow baseline subtracted from every
    /// observed brightness first. A fully shadowed observation (brightness
    /// at or below the baseline) falls back to the no-op factor instead of
    /// amplifying noise.
    pub fn derive_with_baseline(samples: &[WavelengthSample], baseline: f64) -> Self {
        let mut factors = IndexMap::new();
        let mut curves = CorrectionCurves {
            wavelengths: Vec::new(),
            raw: Vec::new(),
            normalized: Vec::new(),
            corrected: Vec::new(),
        };
        let mut fit_points = Vec::new();

        for nm in (GRID_MIN_NM..=GRID_MAX_NM).step_by(GRID_STEP_NM as usize) {
            let theoretical = wavelength_to_rgb(nm as f64).brightness();
            let matched: Vec<f64> = samples
                .iter()
                .filter(|s| (s.wavelength_nm - nm as f64).abs() <= MATCH_WINDOW_NM)
                .map(|s| (s.rgb.brightness() - baseline).max(0.0))
                .collect();

            let (observed, factor) = if matched.is_empty() {
                (0.0, 1.0)
            } else {
                let observed = matched.iter().sum::<f64>() / matched.len() as f64;
                let factor = if observed <= 0.0 {
                    1.0
                } else {
                    (theoretical / observed).clamp(FACTOR_MIN, FACTOR_MAX)
                };
                fit_points.push((scale_wavelength(nm), factor));
                (observed, factor)
            };

            factors.insert(nm, factor);
            curves.wavelengths.push(nm);
            curves.raw.push(observed);
            curves.normalized.push(observed / 255.0);
            curves.corrected.push(observed / 255.0 * factor);
        }

        Self {
            factors,
            polynomial: polyfit_cubic(&fit_points),
            curves: Some(curves),
        }
    }

    /// Rebuild a model from a persisted factor mapping.
    pub fn from_factors(factors: IndexMap<u32, f64>) -> Self {
        Self {
            factors,
            polynomial: None,
            curves: None,
        }
    }

    pub fn factors(&self) -> &IndexMap<u32, f64> {
        &self.factors
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Correct an intensity at a wavelength by the nearest grid point's
    /// factor, or 1.0 when the model lacks that key.
    pub fn apply(&self, wavelength_nm: f64, intensity: f64) -> f64 {
        let nearest = nearest_grid_point(wavelength_nm);
        let factor = self.factors.get(&nearest).copied().unwrap_or(1.0);
        intensity * factor
    }

    /// Aggregate statistics for the calibration summary.
    pub fn statistics(&self, sample_count: usize, regions_detected: usize) -> CalibrationStatistics {
        let matched = self
            .curves
            .as_ref()
            .map(|c| c.raw.iter().filter(|v| **v > 0.0).count())
            .unwrap_or_else(|| self.factors.len());
        let mean_factor = if self.factors.is_empty() {
            0.0
        } else {
            self.factors.values().sum::<f64>() / self.factors.len() as f64
        };
        let wavelength_range = match (self.factors.keys().next(), self.factors.keys().last()) {
            (Some(first), Some(last)) => [*first, *last],
            _ => [0, 0],
        };

        CalibrationStatistics {
            regions_detected,
            sample_count,
            factor_count: matched,
            wavelength_range,
            mean_factor,
        }
    }
}

fn nearest_grid_point(wavelength_nm: f64) -> u32 {
    let stepped = (wavelength_nm / GRID_STEP_NM as f64).round() * GRID_STEP_NM as f64;
    stepped.clamp(GRID_MIN_NM as f64, GRID_MAX_NM as f64) as u32
}

fn scale_wavelength(nm: u32) -> f64 {
    (nm as f64 - 540.0) / 160.0
}

/// Least-squares cubic fit via the normal equations. Returns `None` for
/// fewer than four points or a singular system.
fn polyfit_cubic(points: &[(f64, f64)]) -> Option<[f64; 4]> {
    if points.len() < 4 {
        return None;
    }

    // Normal equations A c = b with A[i][j] = sum x^(i+j), b[i] = sum y x^i.
    let mut pow_sums = [0.0f64; 7];
    let mut b = [0.0f64; 4];
    for &(x, y) in points {
        let mut xp = 1.0;
        for (i, slot) in pow_sums.iter_mut().enumerate() {
            *slot += xp;
            if i < 4 {
                b[i] += y * xp;
            }
            xp *= x;
        }
    }

    let mut a = [[0.0f64; 5]; 4];
    for (i, row) in a.iter_mut().enumerate() {
        for j in 0..4 {
            row[j] = pow_sums[i + j];
        }
        row[4] = b[i];
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..4 {
        let pivot = (col..4).max_by(|&i, &j| {
            a[i][col].abs().partial_cmp(&a[j][col].abs()).unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in (col + 1)..4 {
            let ratio = a[row][col] / a[col][col];
            for k in col..5 {
                a[row][k] -= ratio * a[col][k];
            }
        }
    }

    let mut coeffs = [0.0f64; 4];
    for i in (0..4).rev() {
        let mut acc = a[i][4];
        for j in (i + 1)..4 {
            acc -= a[i][j] * coeffs[j];
        }
        coeffs[i] = acc / a[i][i];
    }
    Some(coeffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{rgb_to_hsv, RgbColor};

    fn sample_at(nm: f64, rgb: RgbColor) -> WavelengthSample {
        WavelengthSample {
            angle_deg: 0.0,
            rgb,
            hsv: rgb_to_hsv(rgb),
            wavelength_nm: nm,
            intensity: rgb.intensity(),
        }
    }

    #[test]
    fn unmatched_grid_points_default_to_one() {
        let model = CorrectionModel::derive(&[sample_at(530.0, RgbColor::new(0, 200, 0))]);
        assert_eq!(model.factors()[&700], 1.0);
        assert_eq!(model.factors()[&380], 1.0);
        assert_ne!(model.factors()[&530], 1.0);
    }

    #[test]
    fn zero_brightness_never_produces_infinity() {
        let model = CorrectionModel::derive(&[sample_at(530.0, RgbColor::new(0, 0, 0))]);
        let factor = model.factors()[&530];
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn factors_stay_within_clamp_bounds() {
        // Nearly black observation against a bright theoretical color.
        let dim = CorrectionModel::derive(&[sample_at(530.0, RgbColor::new(0, 1, 0))]);
        // Very bright observation against an attenuated spectrum edge.
        let hot = CorrectionModel::derive(&[sample_at(700.0, RgbColor::new(255, 255, 255))]);

        for model in [dim, hot] {
            for factor in model.factors().values() {
                assert!((0.1..=10.0).contains(factor), "factor {factor} escaped clamp");
                assert!(factor.is_finite());
            }
        }
    }

    #[test]
    fn apply_uses_nearest_grid_point() {
        let mut factors = IndexMap::new();
        factors.insert(530u32, 2.0);
        let model = CorrectionModel::from_factors(factors);

        assert_eq!(model.apply(533.0, 0.5), 1.0);
        assert_eq!(model.apply(527.0, 0.5), 1.0);
        // 536 rounds to 540, which the model lacks.
        assert_eq!(model.apply(536.0, 0.5), 0.5);
    }

    #[test]
    fn baseline_subtraction_raises_factors() {
        let samples = [sample_at(530.0, RgbColor::new(0, 200, 0))];
        let plain = CorrectionModel::derive(&samples);
        let shadowed = CorrectionModel::derive_with_baseline(&samples, 30.0);
        assert!(shadowed.factors()[&530] > plain.factors()[&530]);
    }

    #[test]
    fn fully_shadowed_observation_is_a_noop() {
        let samples = [sample_at(530.0, RgbColor::new(0, 60, 0))];
        let model = CorrectionModel::derive_with_baseline(&samples, 100.0);
        assert_eq!(model.factors()[&530], 1.0);
        assert!(model.factors().values().all(|f| f.is_finite()));
    }

    #[test]
    fn polynomial_absent_for_sparse_calibrations() {
        // A lone sample at the spectrum edge only reaches three grid
        // points, below the four a cubic needs.
        let model = CorrectionModel::derive(&[sample_at(380.0, RgbColor::new(80, 0, 120))]);
        assert!(model.polynomial.is_none());
    }

    #[test]
    fn polynomial_present_for_full_charts() {
        let samples: Vec<_> = [460.0, 490.0, 530.0, 570.0, 580.0, 625.0]
            .iter()
            .map(|&nm| sample_at(nm, wavelength_to_rgb(nm)))
            .map(|mut s| {
                // Simulate a camera reading slightly dim.
                s.rgb = RgbColor::from_f64(
                    s.rgb.r as f64 * 0.8,
                    s.rgb.g as f64 * 0.8,
                    s.rgb.b as f64 * 0.8,
                );
                s
            })
            .collect();
        let model = CorrectionModel::derive(&samples);
        assert!(model.polynomial.is_some());
    }

    #[test]
    fn statistics_summarize_grid() {
        let model = CorrectionModel::derive(&[sample_at(530.0, RgbColor::new(0, 200, 0))]);
        let stats = model.statistics(72, 1);
        assert_eq!(stats.sample_count, 72);
        assert_eq!(stats.regions_detected, 1);
        assert_eq!(stats.wavelength_range, [380, 700]);
        // 510..=550 fall inside the match window around 530.
        assert_eq!(stats.factor_count, 5);
        assert!(stats.mean_factor > 0.0);
    }
}
