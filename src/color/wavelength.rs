//! Wavelength approximations: hue to wavelength, wavelength to RGB, and
//! wavelength to color name.
//!
//! One canonical hue anchor table is used by every backend so results never
//! drift across strategies.

use super::space::RgbColor;

/// Visible range handled by the calibration math, in nm.
pub const WAVELENGTH_MIN: f64 = 380.0;
pub const WAVELENGTH_MAX: f64 = 700.0;

/// Piecewise-linear hue anchors: (hue degrees, wavelength nm).
/// Hue runs red (0) through the spectrum back to red (360); wavelength runs
/// opposite, 700 down to 380 and wrapping back up.
const HUE_ANCHORS: [(f64, f64); 7] = [
    (0.0, 700.0),
    (60.0, 580.0),
    (120.0, 530.0),
    (180.0, 490.0),
    (240.0, 450.0),
    (300.0, 380.0),
    (360.0, 700.0),
];

/// A named patch on the physical reference chart with its nominal
/// wavelength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPatch {
    pub name: &'static str,
    pub wavelength_nm: f64,
}

/// The six chart patches the calibration chart carries, in hue order.
const CHART_PATCHES: [ChartPatch; 6] = [
    ChartPatch { name: "red", wavelength_nm: 625.0 },
    ChartPatch { name: "yellow", wavelength_nm: 580.0 },
    ChartPatch { name: "green", wavelength_nm: 530.0 },
    ChartPatch { name: "cyan", wavelength_nm: 490.0 },
    ChartPatch { name: "blue", wavelength_nm: 460.0 },
    ChartPatch { name: "magenta", wavelength_nm: 570.0 },
];

pub fn reference_patches() -> &'static [ChartPatch] {
    &CHART_PATCHES
}

/// Map a hue in degrees to an approximate wavelength in nm via the anchor
/// table. Input is normalized into [0, 360).
pub fn hue_to_wavelength(hue: f64) -> f64 {
    let hue = hue.rem_euclid(360.0);

    for pair in HUE_ANCHORS.windows(2) {
        let (h0, w0) = pair[0];
        let (h1, w1) = pair[1];
        if hue <= h1 {
            let t = (hue - h0) / (h1 - h0);
            return w0 + t * (w1 - w0);
        }
    }
    // Unreachable with a normalized hue; the last anchor closes the circle.
    WAVELENGTH_MAX
}

/// Approximate the display color of a monochromatic wavelength.
///
/// Six linear bands define fractional channels, the spectrum edges are
/// attenuated toward 0.3 intensity, and a 0.8 gamma is applied before
/// scaling to 8-bit channels. Wavelengths outside [380, 700] yield black.
pub fn wavelength_to_rgb(nm: f64) -> RgbColor {
    if !(WAVELENGTH_MIN..=WAVELENGTH_MAX).contains(&nm) {
        return RgbColor::new(0, 0, 0);
    }

    let (r, g, b) = if nm < 440.0 {
        (-(nm - 440.0) / (440.0 - 380.0), 0.0, 1.0)
    } else if nm < 490.0 {
        (0.0, (nm - 440.0) / (490.0 - 440.0), 1.0)
    } else if nm < 510.0 {
        (0.0, 1.0, -(nm - 510.0) / (510.0 - 490.0))
    } else if nm < 580.0 {
        ((nm - 510.0) / (580.0 - 510.0), 1.0, 0.0)
    } else if nm < 645.0 {
        (1.0, -(nm - 645.0) / (645.0 - 580.0), 0.0)
    } else {
        (1.0, 0.0, 0.0)
    };

    let factor = if nm < 420.0 {
        0.3 + 0.7 * (nm - 380.0) / (420.0 - 380.0)
    } else if nm > 645.0 {
        0.3 + 0.7 * (700.0 - nm) / (700.0 - 645.0)
    } else {
        1.0
    };

    let scale = |c: f64| -> f64 {
        if c <= 0.0 {
            0.0
        } else {
            255.0 * (c * factor).powf(0.8)
        }
    };

    RgbColor::from_f64(scale(r), scale(g), scale(b))
}

/// Name the spectral band a wavelength falls in. Total over [380, 700];
/// anything outside is "Unknown".
pub fn wavelength_to_color_name(nm: f64) -> &'static str {
    match nm {
        nm if (380.0..450.0).contains(&nm) => "Violet",
        nm if (450.0..495.0).contains(&nm) => "Blue",
        nm if (495.0..570.0).contains(&nm) => "Green",
        nm if (570.0..590.0).contains(&nm) => "Yellow",
        nm if (590.0..620.0).contains(&nm) => "Orange",
        nm if (620.0..=700.0).contains(&nm) => "Red",
        _ => "Unknown",
    }
}
