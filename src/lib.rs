//! # spectracam
//!
//! Estimates a device camera's per-wavelength color-response error from a
//! photographed reference color chart and applies the derived correction to
//! later color samples.
//!
//! Processing runs through one of three interchangeable backends selected
//! at runtime: an injected in-process executor, a remote HTTP service, or a
//! pure-local fallback. [`SpectralProcessor`] is the entry point; it owns
//! the backend chain and the calibration store.
//!
//! ```rust,no_run
//! use spectracam::{Capabilities, Configuration, ImageHandle, SpectralProcessor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let processor = SpectralProcessor::new(Configuration::load()?, Capabilities::default())?;
//! let image = ImageHandle::open("chart.jpg").await?;
//! let artifact = processor.calibrate(&image).await?;
//! processor.save(&artifact).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod chart;
pub mod color;
pub mod config;
pub mod correction;
pub mod error;
pub mod image_source;
pub mod selector;
pub mod store;
pub mod types;

use std::sync::Arc;

use chrono::Utc;

pub use backend::{Capabilities, ExecutorOptions, NativeExecutor, ProcessingBackend};
pub use chart::{ChartCircle, ChartSampler};
pub use color::{HsvColor, RgbColor};
pub use config::Configuration;
pub use correction::CorrectionModel;
pub use error::{AttemptFailure, PersistenceError, ProcessingError, SelectionError};
pub use image_source::{ImageHandle, PixelGrid};
pub use selector::{BackendSelector, FallbackPolicy};
pub use store::{CalibrationStore, FsCalibrationStore, InMemoryCalibrationStore};
pub use types::{
    AnalysisReport, BackendKind, CalibrationArtifact, ProcessingMode, ProcessingOutcome,
    ProcessingResult, ShadowBaseline,
};

/// True iff the artifact carries a non-empty correction mapping. `None`
/// (nothing calibrated yet) is simply invalid, not an error.
pub fn is_calibration_valid(artifact: Option<&CalibrationArtifact>) -> bool {
    artifact.is_some_and(|a| a.is_valid())
}

/// Facade owning the backend chain and the calibration store.
///
/// Nothing is persisted implicitly: a calibration result only reaches the
/// store when the caller invokes [`SpectralProcessor::save`], so an
/// abandoned in-flight call never leaves a partial artifact behind.
pub struct SpectralProcessor {
    selector: BackendSelector,
    store: Arc<dyn CalibrationStore>,
}

impl SpectralProcessor {
    /// Standard construction: three-backend chain plus the filesystem
    /// store at the configured path.
    pub fn new(config: Configuration, capabilities: Capabilities) -> Result<Self, SelectionError> {
        let store = Arc::new(FsCalibrationStore::new(config.calibration_path.clone()));
        Self::with_store(config, capabilities, store)
    }

    pub fn with_store(
        config: Configuration,
        capabilities: Capabilities,
        store: Arc<dyn CalibrationStore>,
    ) -> Result<Self, SelectionError> {
        Ok(Self {
            selector: BackendSelector::new(&config, &capabilities)?,
            store,
        })
    }

    /// Assemble from already-built parts. Used by tests to inject fake
    /// backends.
    pub fn from_parts(selector: BackendSelector, store: Arc<dyn CalibrationStore>) -> Self {
        Self { selector, store }
    }

    /// Run a calibration pass over a chart photo and build the artifact.
    /// The artifact is returned, not saved; call [`save`](Self::save) to
    /// make it the current calibration.
    pub async fn calibrate(&self, image: &ImageHandle) -> Result<CalibrationArtifact, SelectionError> {
        let result = self
            .selector
            .select_and_process(image, ProcessingMode::Calibration)
            .await?;

        match result.outcome {
            ProcessingOutcome::Calibration {
                color_regions,
                correction,
                statistics,
                black_regions,
                baseline,
            } => Ok(CalibrationArtifact {
                timestamp: Utc::now(),
                image_uri: image.uri().to_string(),
                color_samples: color_regions,
                spectral_response: correction.factors().clone(),
                statistics,
                black_regions,
                baseline,
                correction_curves: correction.curves,
            }),
            ProcessingOutcome::Analysis { .. } => Err(SelectionError::Backend(
                ProcessingError::Protocol {
                    reason: format!(
                        "{} backend returned analysis data for a calibration request",
                        result.backend
                    ),
                },
            )),
        }
    }

    /// Analyze an image's color samples. An explicit calibration takes
    /// precedence; otherwise the stored one is applied when present and
    /// valid. Without either, raw samples are returned unchanged.
    pub async fn analyze(
        &self,
        image: &ImageHandle,
        calibration: Option<&CalibrationArtifact>,
    ) -> Result<AnalysisReport, SelectionError> {
        let result = self
            .selector
            .select_and_process(image, ProcessingMode::Analysis)
            .await?;

        let (mut samples, backend, measured) = match result.outcome {
            ProcessingOutcome::Analysis { samples, .. } => (samples, result.backend, result.measured),
            ProcessingOutcome::Calibration { .. } => {
                return Err(SelectionError::Backend(ProcessingError::Protocol {
                    reason: format!(
                        "{} backend returned calibration data for an analysis request",
                        result.backend
                    ),
                }))
            }
        };

        let stored;
        let active = match calibration {
            Some(artifact) => Some(artifact),
            None => {
                stored = self
                    .store
                    .load()
                    .await
                    .map_err(|e| SelectionError::Backend(e.into()))?;
                stored.as_ref()
            }
        };

        let correction_applied = match active.filter(|a| a.is_valid()) {
            Some(artifact) => {
                let model = artifact.correction_model();
                for sample in &mut samples {
                    sample.intensity =
                        model.apply(sample.wavelength_nm, sample.intensity).clamp(0.0, 1.0);
                }
                true
            }
            None => false,
        };

        Ok(AnalysisReport {
            backend,
            measured,
            samples,
            correction_applied,
        })
    }

    /// Persist the artifact as the single current calibration, replacing
    /// any previous one.
    pub async fn save(&self, artifact: &CalibrationArtifact) -> Result<(), PersistenceError> {
        self.store.save(artifact).await
    }

    /// Load the current calibration. `Ok(None)` means no calibration has
    /// been saved yet.
    pub async fn load(&self) -> Result<Option<CalibrationArtifact>, PersistenceError> {
        self.store.load().await
    }
}
