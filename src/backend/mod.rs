//! Interchangeable processing strategies behind one capability contract.

pub mod local;
pub mod native;
pub mod remote;

pub use local::LocalFallbackBackend;
pub use native::NativeBackend;
pub use remote::RemoteBackend;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessingError;
use crate::image_source::ImageHandle;
use crate::types::{BackendKind, ProcessingMode, ProcessingResult};

/// Minimum distinct chart patches a calibration run must detect. Enforced
/// identically by every backend.
pub(crate) const MIN_CALIBRATION_REGIONS: usize = 4;

pub(crate) fn insufficient_regions(found: usize) -> ProcessingError {
    ProcessingError::Execution {
        reason: format!(
            "only {found} distinct chart color(s) detected; calibration needs at \
             least {MIN_CALIBRATION_REGIONS}. Photograph the full reference chart with red, \
             yellow, green, cyan, blue and magenta patches visible"
        ),
    }
}

/// One processing strategy. All implementations honor the mode flag
/// identically: calibration demands at least four distinct chart regions,
/// analysis always returns samples.
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Cheap availability check run before committing to a full attempt,
    /// so a large payload is never shipped to a backend that cannot take it.
    async fn probe(&self) -> Result<(), ProcessingError>;

    async fn process(
        &self,
        image: &ImageHandle,
        mode: ProcessingMode,
    ) -> Result<ProcessingResult, ProcessingError>;
}

/// Options bag handed to the in-process executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorOptions {
    pub force_analysis: bool,
}

/// The in-process executor contract: a callable taking an absolute file
/// path plus options and returning the common result shape.
#[async_trait]
pub trait NativeExecutor: Send + Sync {
    async fn execute(
        &self,
        image_path: &Path,
        options: ExecutorOptions,
    ) -> Result<ProcessingResult, ProcessingError>;
}

/// Capability set constructed once at process initialization and injected
/// into the selector. Native availability is decided here, not by any
/// hidden global lookup, so tests can supply fakes.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub native_executor: Option<Arc<dyn NativeExecutor>>,
}

impl Capabilities {
    pub fn with_native(executor: Arc<dyn NativeExecutor>) -> Self {
        Self {
            native_executor: Some(executor),
        }
    }
}
