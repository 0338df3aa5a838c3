//! Remote HTTP processing backend.
//!
//! Ships the image as base64 JSON to the configured `/process` endpoint and
//! maps the structured response into the common result shape. A lightweight
//! `GET /health` probe runs before any payload is uploaded. The exchange is
//! a minimal HTTP/1.1 client over `tokio::net::TcpStream` with
//! `Connection: close` semantics.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{insufficient_regions, ProcessingBackend, MIN_CALIBRATION_REGIONS};
use crate::color::{rgb_to_hsv, RgbColor};
use crate::correction::CorrectionModel;
use crate::error::{NetworkError, ProcessingError};
use crate::image_source::ImageHandle;
use crate::types::{
    BackendKind, BoundingBox, ColorRegion, Point, ProcessingMode, ProcessingOutcome,
    ProcessingResult, WavelengthSample,
};

pub struct RemoteBackend {
    process_endpoint: Endpoint,
    health_endpoint: Endpoint,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl RemoteBackend {
    pub fn new(
        process_url: &str,
        health_url: &str,
        request_timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, ProcessingError> {
        Ok(Self {
            process_endpoint: Endpoint::parse(process_url)
                .map_err(NetworkError::InvalidEndpoint)?,
            health_endpoint: Endpoint::parse(health_url)
                .map_err(NetworkError::InvalidEndpoint)?,
            request_timeout,
            probe_timeout,
        })
    }
}

#[async_trait]
impl ProcessingBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn probe(&self) -> Result<(), ProcessingError> {
        let (status, _) =
            http_exchange(&self.health_endpoint, "GET", None, self.probe_timeout).await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(NetworkError::Status {
                status,
                body: "health probe failed".to_string(),
            }
            .into())
        }
    }

    async fn process(
        &self,
        image: &ImageHandle,
        mode: ProcessingMode,
    ) -> Result<ProcessingResult, ProcessingError> {
        let payload = build_process_payload(image, mode)?;
        let body = serde_json::to_vec(&payload).map_err(|e| ProcessingError::Protocol {
            reason: format!("failed to encode request: {e}"),
        })?;

        debug!(
            endpoint = %self.process_endpoint.raw,
            bytes = body.len(),
            force_analysis = mode.force_analysis(),
            "uploading image to remote processor"
        );

        let (status, response_body) =
            http_exchange(&self.process_endpoint, "POST", Some(&body), self.request_timeout)
                .await?;
        if !(200..300).contains(&status) {
            return Err(NetworkError::Status {
                status,
                body: String::from_utf8_lossy(&response_body[..response_body.len().min(256)])
                    .into_owned(),
            }
            .into());
        }

        let response: RemoteResponse =
            serde_json::from_slice(&response_body).map_err(|e| ProcessingError::Protocol {
                reason: format!("malformed remote response: {e}"),
            })?;
        convert_response(response, mode)
    }
}

/// JSON body of the `/process` upload: base64 JPEG plus the mode flag.
fn build_process_payload(
    image: &ImageHandle,
    mode: ProcessingMode,
) -> Result<serde_json::Value, ProcessingError> {
    Ok(json!({
        "image": BASE64.encode(image.encoded_jpeg()?),
        "format": "jpg",
        "force_analysis": mode.force_analysis(),
    }))
}

/// Wire shape of the remote service response.
#[derive(Debug, Deserialize)]
struct RemoteResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    color_regions: Option<IndexMap<String, RemoteRegion>>,
}

#[derive(Debug, Deserialize)]
struct RemoteRegion {
    wavelength: f64,
    rgb: RemoteRgb,
    #[serde(default)]
    center: Option<Point>,
    #[serde(default)]
    area: Option<u32>,
    #[serde(default)]
    bbox: Option<BoundingBox>,
}

#[derive(Debug, Deserialize)]
struct RemoteRgb {
    r: f64,
    g: f64,
    b: f64,
}

fn convert_response(
    response: RemoteResponse,
    mode: ProcessingMode,
) -> Result<ProcessingResult, ProcessingError> {
    if !response.success {
        let mut reason = response.error.unwrap_or_else(|| "unspecified remote error".to_string());
        if let Some(kind) = response.error_type {
            reason = format!("{reason} ({kind})");
        }
        return Err(ProcessingError::Protocol { reason });
    }

    let regions: Vec<ColorRegion> = response
        .color_regions
        .unwrap_or_default()
        .into_iter()
        .map(|(label, r)| ColorRegion {
            label,
            wavelength: r.wavelength,
            rgb: RgbColor::from_f64(r.rgb.r, r.rgb.g, r.rgb.b),
            center: r.center.unwrap_or(Point { x: 0, y: 0 }),
            area: r.area.unwrap_or(0),
            bbox: r.bbox.unwrap_or(BoundingBox { x: 0, y: 0, width: 0, height: 0 }),
        })
        .collect();
    let samples = samples_from_regions(&regions);

    let analysis_only = response.mode.as_deref() == Some("analysis_only");
    let outcome = if mode.force_analysis() || analysis_only {
        ProcessingOutcome::Analysis {
            samples,
            correction_applied: false,
        }
    } else {
        if regions.len() < MIN_CALIBRATION_REGIONS {
            return Err(insufficient_regions(regions.len()));
        }
        // The correction grid is rebuilt locally from the detected regions
        // so every backend shares one anchor table and clamp policy. The
        // remote processor subtracts its own shadow baseline before
        // reporting regions, so none is applied again here.
        let correction = CorrectionModel::derive(&samples);
        let statistics = correction.statistics(samples.len(), regions.len());
        ProcessingOutcome::Calibration {
            color_regions: regions,
            correction,
            statistics,
            black_regions: Vec::new(),
            baseline: 0.0,
        }
    };

    Ok(ProcessingResult {
        backend: BackendKind::Remote,
        measured: true,
        outcome,
    })
}

fn samples_from_regions(regions: &[ColorRegion]) -> Vec<WavelengthSample> {
    regions
        .iter()
        .map(|r| {
            let hsv = rgb_to_hsv(r.rgb);
            WavelengthSample {
                angle_deg: hsv.hue,
                rgb: r.rgb,
                hsv,
                wavelength_nm: r.wavelength,
                intensity: r.rgb.intensity(),
            }
        })
        .collect()
}

/// A parsed `http://host[:port]/path` endpoint.
#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
    path: String,
    raw: String,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| format!("{url}: only http:// endpoints are supported"))?;
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| format!("{url}: invalid port"))?;
                (host, port)
            }
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(format!("{url}: missing host"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
            raw: url.to_string(),
        })
    }
}

/// One HTTP/1.1 request/response exchange with `Connection: close`.
async fn http_exchange(
    endpoint: &Endpoint,
    method: &str,
    body: Option<&[u8]>,
    timeout: Duration,
) -> Result<(u16, Vec<u8>), NetworkError> {
    let exchange = async {
        let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|source| NetworkError::Connect {
                endpoint: endpoint.raw.clone(),
                source,
            })?;

        let mut request = format!(
            "{method} {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\nAccept: application/json\r\n",
            path = endpoint.path,
            host = endpoint.host,
        );
        if let Some(body) = body {
            request.push_str(&format!(
                "Content-Type: application/json\r\nContent-Length: {}\r\n",
                body.len()
            ));
        }
        request.push_str("\r\n");

        let io_err = |source| NetworkError::Io {
            endpoint: endpoint.raw.clone(),
            source,
        };
        stream.write_all(request.as_bytes()).await.map_err(io_err)?;
        if let Some(body) = body {
            stream.write_all(body).await.map_err(io_err)?;
        }

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.map_err(io_err)?;
        parse_response(&raw, endpoint)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| NetworkError::Timeout {
            endpoint: endpoint.raw.clone(),
            seconds: timeout.as_secs(),
        })?
}

fn parse_response(raw: &[u8], endpoint: &Endpoint) -> Result<(u16, Vec<u8>), NetworkError> {
    let malformed = || NetworkError::Io {
        endpoint: endpoint.raw.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed HTTP response"),
    };

    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(malformed)?;
    let head = std::str::from_utf8(&raw[..header_end]).map_err(|_| malformed())?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().ok_or_else(malformed)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(malformed)?;

    let chunked = lines.any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("transfer-encoding:") && lower.contains("chunked")
    });

    let body = &raw[header_end + 4..];
    let body = if chunked {
        decode_chunked(body).ok_or_else(malformed)?
    } else {
        body.to_vec()
    };
    Ok((status, body))
}

fn decode_chunked(mut body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let line_end = body.windows(2).position(|w| w == b"\r\n")?;
        let size_str = std::str::from_utf8(&body[..line_end]).ok()?;
        let size = usize::from_str_radix(size_str.trim().split(';').next()?, 16).ok()?;
        body = &body[line_end + 2..];
        if size == 0 {
            return Some(out);
        }
        if body.len() < size + 2 {
            return None;
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}
