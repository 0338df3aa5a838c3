//! End-to-end tests: chart analysis and calibration through the full
//! backend selection chain, plus persistence round trips.
//!
//! The remote endpoint points at a closed local port so its availability
//! probe fails immediately and selection falls through deterministically.

use std::sync::Arc;

use spectracam::color::wavelength_to_color_name;
use spectracam::{
    is_calibration_valid, BackendKind, Capabilities, Configuration, ImageHandle,
    InMemoryCalibrationStore, PixelGrid, RgbColor, SelectionError, SpectralProcessor,
};

fn offline_config(allow_local_fallback: bool) -> Configuration {
    Configuration {
        remote_endpoint: "http://127.0.0.1:9/process".to_string(),
        remote_health_endpoint: "http://127.0.0.1:9/health".to_string(),
        request_timeout_secs: 2,
        probe_timeout_secs: 1,
        allow_local_fallback,
        ..Configuration::default()
    }
}

fn processor(allow_local_fallback: bool) -> SpectralProcessor {
    SpectralProcessor::with_store(
        offline_config(allow_local_fallback),
        Capabilities::default(),
        Arc::new(InMemoryCalibrationStore::new()),
    )
    .expect("processor construction")
}

/// Uniform red image with the chart assumed centered.
fn red_image() -> ImageHandle {
    ImageHandle::from_grid(
        "test://uniform-red",
        PixelGrid::filled(500, 500, RgbColor::new(255, 0, 0)),
    )
}

/// A six-sector color wheel covering the assumed chart circle: red,
/// yellow, green, cyan, blue, magenta in ascending angle order.
fn chart_image() -> ImageHandle {
    const SECTORS: [RgbColor; 6] = [
        RgbColor::new(230, 20, 20),
        RgbColor::new(230, 230, 20),
        RgbColor::new(20, 230, 20),
        RgbColor::new(20, 230, 230),
        RgbColor::new(20, 20, 230),
        RgbColor::new(230, 20, 230),
    ];
    let (w, h) = (500u32, 500u32);
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let mut grid = PixelGrid::filled(w, h, RgbColor::new(0, 0, 0));
    for y in 0..h {
        for x in 0..w {
            // Same convention as the sampler: y-axis inverted.
            let angle = (cy - y as f64).atan2(x as f64 - cx).to_degrees().rem_euclid(360.0);
            let sector = ((angle / 60.0).floor() as usize).min(5);
            grid.set(x, y, SECTORS[sector]);
        }
    }
    ImageHandle::from_grid("test://chart-wheel", grid)
}

#[tokio::test]
async fn uniform_red_analysis_falls_back_to_local() {
    let processor = processor(true);
    let report = processor.analyze(&red_image(), None).await.unwrap();

    assert_eq!(report.backend, BackendKind::LocalFallback);
    assert!(report.measured);
    assert!(!report.correction_applied);
    assert_eq!(report.samples.len(), 72);
    for sample in &report.samples {
        assert!(sample.hsv.hue.abs() < 1.0);
        assert!((sample.wavelength_nm - 700.0).abs() < 2.0);
        assert_eq!(wavelength_to_color_name(sample.wavelength_nm), "Red");
    }
}

#[tokio::test]
async fn calibrate_save_load_round_trip() {
    let processor = processor(true);

    assert!(!is_calibration_valid(processor.load().await.unwrap().as_ref()));

    let artifact = processor.calibrate(&chart_image()).await.unwrap();
    assert!(artifact.is_valid());
    assert!(artifact.statistics.regions_detected >= 4);
    assert_eq!(artifact.image_uri, "test://chart-wheel");
    // Measured pixels always yield a four-corner shadow baseline.
    assert_eq!(artifact.black_regions.len(), 4);
    assert!(artifact.baseline > 0.0);
    for factor in artifact.spectral_response.values() {
        assert!((0.1..=10.0).contains(factor));
    }

    processor.save(&artifact).await.unwrap();
    let loaded = processor.load().await.unwrap().unwrap();
    assert_eq!(loaded, artifact);
    assert!(is_calibration_valid(Some(&loaded)));
}

#[tokio::test]
async fn analysis_applies_stored_calibration() {
    let processor = processor(true);

    let artifact = processor.calibrate(&chart_image()).await.unwrap();
    processor.save(&artifact).await.unwrap();

    let report = processor.analyze(&red_image(), None).await.unwrap();
    assert!(report.correction_applied);
    for sample in &report.samples {
        assert!((0.0..=1.0).contains(&sample.intensity));
    }
}

#[tokio::test]
async fn calibration_of_single_color_image_fails_with_reason() {
    let processor = processor(true);
    let err = processor.calibrate(&red_image()).await.unwrap_err();
    match err {
        SelectionError::Backend(e) => {
            assert!(e.to_string().contains("calibration needs at least"));
        }
        other => panic!("expected surfaced execution error, got {other}"),
    }
}

#[tokio::test]
async fn exhausted_chain_reports_every_backend() {
    // No native executor, unreachable remote, local fallback disabled.
    let processor = processor(false);
    let err = processor.analyze(&red_image(), None).await.unwrap_err();
    match err {
        SelectionError::Exhausted(attempts) => {
            let kinds: Vec<_> = attempts.iter().map(|a| a.backend).collect();
            assert_eq!(
                kinds,
                vec![BackendKind::Native, BackendKind::Remote, BackendKind::LocalFallback]
            );
        }
        other => panic!("expected exhausted error, got {other}"),
    }
}
