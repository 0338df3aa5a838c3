//! Shared data types for chart sampling, calibration and backend results.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::color::{HsvColor, RgbColor};
use crate::correction::{CorrectionCurves, CorrectionModel};

/// Which processing strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Native,
    Remote,
    LocalFallback,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Native => "native",
            BackendKind::Remote => "remote",
            BackendKind::LocalFallback => "local_fallback",
        };
        f.write_str(name)
    }
}

/// Processing mode propagated identically to every backend.
///
/// `Calibration` expects at least four distinct chart regions and yields a
/// correction model; `Analysis` always returns color samples regardless of
/// region count (the remote wire calls this `force_analysis`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Calibration,
    Analysis,
}

impl ProcessingMode {
    pub fn force_analysis(&self) -> bool {
        matches!(self, ProcessingMode::Analysis)
    }
}

/// One circular-sampling observation: a pixel color plus its estimated
/// place on the visible spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavelengthSample {
    /// Angle on the chart circle, degrees in [0, 360).
    pub angle_deg: f64,
    pub rgb: RgbColor,
    pub hsv: HsvColor,
    /// Estimated wavelength in nm, within [380, 700].
    pub wavelength_nm: f64,
    /// Mean channel brightness normalized to [0, 1].
    pub intensity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A detected (or assumed) patch on the reference chart. Exists only while
/// a single image is being sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRegion {
    /// Chart patch name, e.g. "green".
    pub label: String,
    /// Nominal wavelength of the patch in nm.
    pub wavelength: f64,
    /// Average observed color over the patch.
    pub rgb: RgbColor,
    pub center: Point,
    /// Member pixel count backing this region.
    pub area: u32,
    pub bbox: BoundingBox,
}

/// Mean color of one image corner, sampled for shadow-baseline estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerSample {
    /// Corner name, e.g. "top_left".
    pub corner: String,
    pub rgb: RgbColor,
    pub bbox: BoundingBox,
}

/// Ambient-shadow baseline measured from the four image corners. Chart
/// photos keep the corners off the chart, so their brightness approximates
/// the shadow level the patches sit in; the calibration path subtracts it
/// from observed brightness before deriving correction factors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowBaseline {
    pub corners: Vec<CornerSample>,
    /// Mean corner brightness on the [0, 255] scale.
    pub brightness: f64,
}

/// Summary statistics attached to a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatistics {
    pub regions_detected: usize,
    pub sample_count: usize,
    pub factor_count: usize,
    /// [min, max] wavelength (nm) with a derived factor.
    pub wavelength_range: [u32; 2],
    pub mean_factor: f64,
}

/// Mode-discriminated payload of a successful backend run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Calibration {
        color_regions: Vec<ColorRegion>,
        correction: CorrectionModel,
        statistics: CalibrationStatistics,
        black_regions: Vec<CornerSample>,
        baseline: f64,
    },
    Analysis {
        samples: Vec<WavelengthSample>,
        correction_applied: bool,
    },
}

/// Transient result of one backend call, tagged with the backend that
/// produced it and whether real pixels were measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub backend: BackendKind,
    /// False when the payload was synthesized rather than read from pixels.
    pub measured: bool,
    #[serde(flatten)]
    pub outcome: ProcessingOutcome,
}

/// The single persisted calibration. Each save overwrites the prior one;
/// there is no version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    pub timestamp: DateTime<Utc>,
    pub image_uri: String,
    pub color_samples: Vec<ColorRegion>,
    /// Wavelength (nm) to correction factor, keys in ascending order.
    pub spectral_response: IndexMap<u32, f64>,
    pub statistics: CalibrationStatistics,
    /// Corner patches backing the shadow baseline; empty when the producing
    /// backend had no raw pixels to sample.
    #[serde(default)]
    pub black_regions: Vec<CornerSample>,
    /// Shadow baseline subtracted during factor derivation, [0, 255] scale.
    #[serde(default)]
    pub baseline: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_curves: Option<CorrectionCurves>,
}

impl CalibrationArtifact {
    /// True iff a correction mapping exists and is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.spectral_response.is_empty()
    }

    pub fn correction_model(&self) -> CorrectionModel {
        CorrectionModel::from_factors(self.spectral_response.clone())
    }
}

/// Result of an analysis run as returned to the caller, after any stored
/// calibration has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub backend: BackendKind,
    pub measured: bool,
    pub samples: Vec<WavelengthSample>,
    pub correction_applied: bool,
}
