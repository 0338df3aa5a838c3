use std::path::PathBuf;

use serde::Deserialize;

/// Runtime configuration for the processor and its backends.
///
/// Values layer in order: built-in defaults, an optional `spectracam.toml`
/// in the working directory, then `SPECTRACAM_`-prefixed environment
/// variables (e.g. `SPECTRACAM_REMOTE_ENDPOINT`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Full URL of the remote processing endpoint.
    pub remote_endpoint: String,
    /// Health-probe URL checked before committing to a payload upload.
    pub remote_health_endpoint: String,
    /// Timeout for the full remote exchange, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the lightweight health probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Whether the selector may fall through to pure-local computation.
    /// Local results are lower fidelity and must be opted into.
    pub allow_local_fallback: bool,
    /// Path of the single current calibration artifact.
    pub calibration_path: PathBuf,
    /// Number of angular samples taken around the chart circle.
    pub sample_count: usize,
    /// Fraction of the chart radius sampled in analysis mode.
    pub analysis_radius_fraction: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            remote_endpoint: "http://127.0.0.1:5000/process".to_string(),
            remote_health_endpoint: "http://127.0.0.1:5000/health".to_string(),
            request_timeout_secs: 30,
            probe_timeout_secs: 3,
            allow_local_fallback: false,
            calibration_path: PathBuf::from("calibration_data.json"),
            sample_count: 72,
            analysis_radius_fraction: 0.8,
        }
    }
}

impl Configuration {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("spectracam").required(false))
            .add_source(config::Environment::with_prefix("SPECTRACAM"))
            .build()?
            .try_deserialize()
    }
}
