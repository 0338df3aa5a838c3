//! In-process executor backend.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ExecutorOptions, NativeExecutor, ProcessingBackend};
use crate::error::ProcessingError;
use crate::image_source::ImageHandle;
use crate::types::{BackendKind, ProcessingMode, ProcessingResult};

/// Delegates to an injected in-process executor carrying the same chart and
/// correction logic. Unavailable when the build or platform does not
/// provide one.
pub struct NativeBackend {
    executor: Option<Arc<dyn NativeExecutor>>,
}

impl NativeBackend {
    pub fn new(executor: Option<Arc<dyn NativeExecutor>>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ProcessingBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn probe(&self) -> Result<(), ProcessingError> {
        if self.executor.is_some() {
            Ok(())
        } else {
            Err(ProcessingError::Unavailable {
                backend: BackendKind::Native,
                reason: "no in-process executor on this platform; rebuild with native support"
                    .to_string(),
            })
        }
    }

    async fn process(
        &self,
        image: &ImageHandle,
        mode: ProcessingMode,
    ) -> Result<ProcessingResult, ProcessingError> {
        let executor = self.executor.as_ref().ok_or_else(|| ProcessingError::Unavailable {
            backend: BackendKind::Native,
            reason: "no in-process executor on this platform".to_string(),
        })?;
        // The executor contract takes an absolute file path.
        let path = image.file_path().ok_or_else(|| ProcessingError::Unavailable {
            backend: BackendKind::Native,
            reason: format!("image {} is not file-backed", image.uri()),
        })?;

        let options = ExecutorOptions {
            force_analysis: mode.force_analysis(),
        };
        let mut result = executor.execute(path, options).await?;
        result.backend = BackendKind::Native;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessingOutcome;
    use std::path::Path;

    struct StubExecutor;

    #[async_trait]
    impl NativeExecutor for StubExecutor {
        async fn execute(
            &self,
            _image_path: &Path,
            options: ExecutorOptions,
        ) -> Result<ProcessingResult, ProcessingError> {
            assert!(options.force_analysis);
            Ok(ProcessingResult {
                backend: BackendKind::Native,
                measured: true,
                outcome: ProcessingOutcome::Analysis {
                    samples: Vec::new(),
                    correction_applied: false,
                },
            })
        }
    }

    #[tokio::test]
    async fn absent_executor_probes_unavailable() {
        let backend = NativeBackend::new(None);
        assert!(matches!(
            backend.probe().await,
            Err(ProcessingError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn non_file_image_is_unavailable_not_fatal() {
        let backend = NativeBackend::new(Some(Arc::new(StubExecutor)));
        let image = ImageHandle::from_uri("content://capture/1");
        let err = backend
            .process(&image, ProcessingMode::Analysis)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Unavailable { .. }));
    }
}
