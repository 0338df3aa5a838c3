//! Ordered backend selection with fallback.
//!
//! One operation: try the native executor, then the remote service, then
//! (policy permitting) pure-local computation, returning the first
//! successful result tagged with the backend that produced it. Execution
//! failures surface immediately instead of falling back, because a
//! lower-fidelity backend would fail the same way on the same image.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{
    Capabilities, LocalFallbackBackend, NativeBackend, ProcessingBackend, RemoteBackend,
};
use crate::config::Configuration;
use crate::error::{AttemptFailure, ProcessingError, SelectionError};
use crate::image_source::ImageHandle;
use crate::types::{BackendKind, ProcessingMode, ProcessingResult};

/// Selection states, advanced in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorState {
    TryNative,
    TryRemote,
    TryLocalFallback,
    Exhausted,
}

impl SelectorState {
    fn next(self) -> Self {
        match self {
            SelectorState::TryNative => SelectorState::TryRemote,
            SelectorState::TryRemote => SelectorState::TryLocalFallback,
            SelectorState::TryLocalFallback | SelectorState::Exhausted => SelectorState::Exhausted,
        }
    }

    fn target(self) -> Option<BackendKind> {
        match self {
            SelectorState::TryNative => Some(BackendKind::Native),
            SelectorState::TryRemote => Some(BackendKind::Remote),
            SelectorState::TryLocalFallback => Some(BackendKind::LocalFallback),
            SelectorState::Exhausted => None,
        }
    }
}

/// Which failures advance the chain versus surface to the caller.
fn advances_chain(error: &ProcessingError) -> bool {
    matches!(
        error,
        ProcessingError::Unavailable { .. }
            | ProcessingError::Network(_)
            | ProcessingError::Protocol { .. }
    )
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    /// Pure-local computation is measurably less accurate; it must be
    /// opted into explicitly.
    pub allow_local_fallback: bool,
}

pub struct BackendSelector {
    backends: Vec<Arc<dyn ProcessingBackend>>,
    policy: FallbackPolicy,
}

impl BackendSelector {
    /// Build the standard three-backend chain from configuration and the
    /// capability set fixed at process initialization.
    pub fn new(config: &Configuration, capabilities: &Capabilities) -> Result<Self, SelectionError> {
        let remote = RemoteBackend::new(
            &config.remote_endpoint,
            &config.remote_health_endpoint,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.probe_timeout_secs),
        )
        .map_err(SelectionError::Backend)?;

        Ok(Self {
            backends: vec![
                Arc::new(NativeBackend::new(capabilities.native_executor.clone())),
                Arc::new(remote),
                Arc::new(LocalFallbackBackend::new(
                    config.sample_count,
                    config.analysis_radius_fraction,
                )),
            ],
            policy: FallbackPolicy {
                allow_local_fallback: config.allow_local_fallback,
            },
        })
    }

    /// Chain with injected backends, for tests and embedding. Backends are
    /// matched to states by their `kind()`.
    pub fn with_backends(backends: Vec<Arc<dyn ProcessingBackend>>, policy: FallbackPolicy) -> Self {
        Self { backends, policy }
    }

    fn backend_for(&self, kind: BackendKind) -> Option<&Arc<dyn ProcessingBackend>> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    /// Walk the state machine until a backend succeeds or the chain is
    /// exhausted.
    pub async fn select_and_process(
        &self,
        image: &ImageHandle,
        mode: ProcessingMode,
    ) -> Result<ProcessingResult, SelectionError> {
        let request_id = Uuid::new_v4();
        let mut state = SelectorState::TryNative;
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        info!(%request_id, uri = image.uri(), ?mode, "backend selection started");

        while let Some(kind) = state.target() {
            let outcome = self.attempt(request_id, kind, image, mode).await;
            match outcome {
                AttemptOutcome::Success(result) => {
                    info!(%request_id, backend = %kind, measured = result.measured, "selection complete");
                    return Ok(result);
                }
                AttemptOutcome::Fatal(e) => {
                    error!(%request_id, backend = %kind, error = %e, "backend failed without fallback");
                    return Err(SelectionError::Backend(e));
                }
                AttemptOutcome::Advance(reason) => {
                    attempts.push(AttemptFailure { backend: kind, reason });
                    let next = state.next();
                    debug!(%request_id, from = ?state, to = ?next, "advancing selection state");
                    state = next;
                }
            }
        }

        error!(%request_id, tried = attempts.len(), "all backends exhausted");
        Err(SelectionError::Exhausted(attempts))
    }

    async fn attempt(
        &self,
        request_id: Uuid,
        kind: BackendKind,
        image: &ImageHandle,
        mode: ProcessingMode,
    ) -> AttemptOutcome {
        if kind == BackendKind::LocalFallback && !self.policy.allow_local_fallback {
            debug!(%request_id, backend = %kind, "skipped: local fallback disabled by policy");
            return AttemptOutcome::Advance("disabled by fallback policy".to_string());
        }

        let Some(backend) = self.backend_for(kind) else {
            return AttemptOutcome::Advance("backend not configured".to_string());
        };

        if let Err(e) = backend.probe().await {
            warn!(%request_id, backend = %kind, error = %e, "availability probe failed");
            return AttemptOutcome::Advance(e.to_string());
        }

        debug!(%request_id, backend = %kind, "processing");
        match backend.process(image, mode).await {
            Ok(result) => AttemptOutcome::Success(result),
            Err(e) if advances_chain(&e) => {
                warn!(%request_id, backend = %kind, error = %e, "backend failed; trying next");
                AttemptOutcome::Advance(e.to_string())
            }
            Err(e) => AttemptOutcome::Fatal(e),
        }
    }
}

enum AttemptOutcome {
    Success(ProcessingResult),
    Advance(String),
    Fatal(ProcessingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::types::ProcessingOutcome;
    use async_trait::async_trait;

    struct FakeBackend {
        kind: BackendKind,
        probe_error: Option<fn() -> ProcessingError>,
        process_error: Option<fn() -> ProcessingError>,
    }

    impl FakeBackend {
        fn ok(kind: BackendKind) -> Self {
            Self { kind, probe_error: None, process_error: None }
        }

        fn failing(kind: BackendKind, process_error: fn() -> ProcessingError) -> Self {
            Self { kind, probe_error: None, process_error: Some(process_error) }
        }

        fn unavailable(kind: BackendKind) -> Self {
            Self {
                kind,
                probe_error: Some(|| ProcessingError::Unavailable {
                    backend: BackendKind::Native,
                    reason: "missing".to_string(),
                }),
                process_error: None,
            }
        }
    }

    #[async_trait]
    impl ProcessingBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn probe(&self) -> Result<(), ProcessingError> {
            match self.probe_error {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }

        async fn process(
            &self,
            _image: &ImageHandle,
            _mode: ProcessingMode,
        ) -> Result<ProcessingResult, ProcessingError> {
            if let Some(make) = self.process_error {
                return Err(make());
            }
            Ok(ProcessingResult {
                backend: self.kind,
                measured: true,
                outcome: ProcessingOutcome::Analysis {
                    samples: Vec::new(),
                    correction_applied: false,
                },
            })
        }
    }

    fn network_error() -> ProcessingError {
        ProcessingError::Network(NetworkError::Timeout {
            endpoint: "http://remote/process".to_string(),
            seconds: 3,
        })
    }

    fn selector(backends: Vec<Arc<dyn ProcessingBackend>>, allow_local: bool) -> BackendSelector {
        BackendSelector::with_backends(
            backends,
            FallbackPolicy { allow_local_fallback: allow_local },
        )
    }

    #[tokio::test]
    async fn falls_through_to_local_and_tags_result() {
        let s = selector(
            vec![
                Arc::new(FakeBackend::unavailable(BackendKind::Native)),
                Arc::new(FakeBackend::failing(BackendKind::Remote, network_error)),
                Arc::new(FakeBackend::ok(BackendKind::LocalFallback)),
            ],
            true,
        );
        let image = ImageHandle::from_uri("test://x");
        let result = s.select_and_process(&image, ProcessingMode::Analysis).await.unwrap();
        assert_eq!(result.backend, BackendKind::LocalFallback);
    }

    #[tokio::test]
    async fn exhausted_error_names_every_backend() {
        let s = selector(
            vec![
                Arc::new(FakeBackend::unavailable(BackendKind::Native)),
                Arc::new(FakeBackend::failing(BackendKind::Remote, network_error)),
                Arc::new(FakeBackend::failing(BackendKind::LocalFallback, || {
                    ProcessingError::Protocol { reason: "bad payload".to_string() }
                })),
            ],
            true,
        );
        let image = ImageHandle::from_uri("test://x");
        let err = s.select_and_process(&image, ProcessingMode::Analysis).await.unwrap_err();
        match err {
            SelectionError::Exhausted(attempts) => {
                let kinds: Vec<_> = attempts.iter().map(|a| a.backend).collect();
                assert_eq!(
                    kinds,
                    vec![BackendKind::Native, BackendKind::Remote, BackendKind::LocalFallback]
                );
            }
            other => panic!("expected exhausted, got {other}"),
        }
    }

    #[tokio::test]
    async fn local_fallback_requires_policy_opt_in() {
        let s = selector(
            vec![
                Arc::new(FakeBackend::unavailable(BackendKind::Native)),
                Arc::new(FakeBackend::failing(BackendKind::Remote, network_error)),
                Arc::new(FakeBackend::ok(BackendKind::LocalFallback)),
            ],
            false,
        );
        let image = ImageHandle::from_uri("test://x");
        let err = s.select_and_process(&image, ProcessingMode::Analysis).await.unwrap_err();
        assert!(matches!(err, SelectionError::Exhausted(_)));
    }

    #[tokio::test]
    async fn execution_errors_surface_without_fallback() {
        let s = selector(
            vec![
                Arc::new(FakeBackend::failing(BackendKind::Native, || {
                    ProcessingError::Execution { reason: "chart not found".to_string() }
                })),
                Arc::new(FakeBackend::ok(BackendKind::Remote)),
                Arc::new(FakeBackend::ok(BackendKind::LocalFallback)),
            ],
            true,
        );
        let image = ImageHandle::from_uri("test://x");
        let err = s.select_and_process(&image, ProcessingMode::Calibration).await.unwrap_err();
        assert!(matches!(
            err,
            SelectionError::Backend(ProcessingError::Execution { .. })
        ));
    }

    #[tokio::test]
    async fn first_healthy_backend_wins() {
        let s = selector(
            vec![
                Arc::new(FakeBackend::ok(BackendKind::Native)),
                Arc::new(FakeBackend::ok(BackendKind::Remote)),
            ],
            false,
        );
        let image = ImageHandle::from_uri("test://x");
        let result = s.select_and_process(&image, ProcessingMode::Analysis).await.unwrap();
        assert_eq!(result.backend, BackendKind::Native);
    }
}
