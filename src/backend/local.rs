//! Pure-local fallback backend.
//!
//! Runs the chart sampler and correction math directly against decoded
//! pixels. Always available, but lower fidelity: the chart position is
//! assumed rather than detected, and when the handle carries no pixels at
//! all the samples are synthesized around theoretical chart colors. Results
//! from the synthetic path are approximations, never measurements, and are
//! flagged `measured: false`.

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use super::{insufficient_regions, ProcessingBackend, MIN_CALIBRATION_REGIONS};
use crate::chart::{corner_baseline, ChartCircle, ChartSampler};
use crate::color::{hue_to_wavelength, rgb_to_hsv, wavelength_to_rgb, RgbColor};
use crate::correction::CorrectionModel;
use crate::error::ProcessingError;
use crate::image_source::ImageHandle;
use crate::types::{
    BackendKind, ProcessingMode, ProcessingOutcome, ProcessingResult, ShadowBaseline,
    WavelengthSample,
};

/// Channel noise amplitude for synthesized samples.
const SYNTHETIC_NOISE: i32 = 12;

pub struct LocalFallbackBackend {
    sample_count: usize,
    analysis_radius_fraction: f64,
}

impl LocalFallbackBackend {
    pub fn new(sample_count: usize, analysis_radius_fraction: f64) -> Self {
        Self {
            sample_count,
            analysis_radius_fraction,
        }
    }

    fn sampler_for(&self, mode: ProcessingMode) -> ChartSampler {
        match mode {
            ProcessingMode::Calibration => ChartSampler::for_calibration(self.sample_count),
            ProcessingMode::Analysis => {
                ChartSampler::new(self.sample_count, self.analysis_radius_fraction)
            }
        }
    }

    /// Chart-colored samples with bounded noise, used when no decoded
    /// pixels are available.
    fn synthesize_samples(&self) -> Vec<WavelengthSample> {
        let mut rng = rand::rng();
        let step = 360.0 / self.sample_count as f64;

        (0..self.sample_count)
            .map(|i| {
                let angle_deg = i as f64 * step;
                let base = wavelength_to_rgb(hue_to_wavelength(angle_deg));
                let mut jitter = |c: u8| -> f64 {
                    c as f64 + rng.random_range(-SYNTHETIC_NOISE..=SYNTHETIC_NOISE) as f64
                };
                let rgb = RgbColor::from_f64(jitter(base.r), jitter(base.g), jitter(base.b));
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

    fn build_outcome(
        &self,
        sampler: &ChartSampler,
        circle: &ChartCircle,
        samples: Vec<WavelengthSample>,
        baseline: ShadowBaseline,
        mode: ProcessingMode,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        match mode {
            ProcessingMode::Analysis => Ok(ProcessingOutcome::Analysis {
                samples,
                correction_applied: false,
            }),
            ProcessingMode::Calibration => {
                let regions = sampler.group_regions(&samples, circle);
                if regions.len() < MIN_CALIBRATION_REGIONS {
                    return Err(insufficient_regions(regions.len()));
                }
                let correction =
                    CorrectionModel::derive_with_baseline(&samples, baseline.brightness);
                let statistics = correction.statistics(samples.len(), regions.len());
                Ok(ProcessingOutcome::Calibration {
                    color_regions: regions,
                    correction,
                    statistics,
                    black_regions: baseline.corners,
                    baseline: baseline.brightness,
                })
            }
        }
    }
}

#[async_trait]
impl ProcessingBackend for LocalFallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFallback
    }

    /// The local path has no external prerequisites.
    async fn probe(&self) -> Result<(), ProcessingError> {
        Ok(())
    }

    async fn process(
        &self,
        image: &ImageHandle,
        mode: ProcessingMode,
    ) -> Result<ProcessingResult, ProcessingError> {
        let sampler = self.sampler_for(mode);

        let (samples, circle, baseline, measured) = match image.pixels() {
            Some(grid) => {
                let circle = ChartCircle::assumed(grid.width(), grid.height());
                debug!(
                    uri = image.uri(),
                    width = grid.width(),
                    height = grid.height(),
                    "sampling assumed chart circle"
                );
                (sampler.sample(grid, Some(circle)), circle, corner_baseline(grid), true)
            }
            None => {
                warn!(
                    uri = image.uri(),
                    "no decoded pixels available; synthesizing chart samples"
                );
                // A nominal circle so region centroids stay well defined.
                // Synthesized colors carry no shadow, so no baseline either.
                let circle = ChartCircle::assumed(500, 500);
                (self.synthesize_samples(), circle, ShadowBaseline::default(), false)
            }
        };

        let outcome = self.build_outcome(&sampler, &circle, samples, baseline, mode)?;
        Ok(ProcessingResult {
            backend: BackendKind::LocalFallback,
            measured,
            outcome,
        })
    }
}
