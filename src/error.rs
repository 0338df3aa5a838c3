use thiserror::Error;

use crate::types::BackendKind;

/// Failure of a single backend attempt.
///
/// The variant decides what the selector does next: `Unavailable`,
/// `Network` and `Protocol` advance the fallback chain, `Execution` and
/// `Persistence` surface to the caller immediately (a lower-fidelity
/// backend would fail the same way).
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Processing failed: {reason}")]
    Execution { reason: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Request to {endpoint} failed: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Request to {endpoint} timed out after {seconds}s")]
    Timeout { endpoint: String, seconds: u64 },
    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read calibration: {0}")]
    Read(std::io::Error),
    #[error("Failed to write calibration: {0}")]
    Write(std::io::Error),
    #[error("Calibration serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One recorded backend failure inside an exhausted fallback chain.
#[derive(Debug)]
pub struct AttemptFailure {
    pub backend: BackendKind,
    pub reason: String,
}

pub(crate) fn describe_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.backend, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal error of a full backend selection run.
#[derive(Error, Debug)]
pub enum SelectionError {
    /// A backend ran and failed in a way fallback cannot help with.
    #[error("{0}")]
    Backend(#[from] ProcessingError),

    /// Every permitted backend was tried; each failure is listed so the
    /// caller can act (check the network, rebuild with native support, or
    /// enable the local fallback policy).
    #[error("All backends exhausted: {}", describe_attempts(.0))]
    Exhausted(Vec<AttemptFailure>),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
