//! RGB and HSV color types and conversions between them.
//!
//! HSV uses hue in degrees [0, 360) and saturation/value as percentages
//! [0, 100]. Round trips through RGB are lossy at integer precision.

use serde::{Deserialize, Serialize};

/// An 8-bit-per-channel RGB color. No alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from unclamped floating-point channels in [0, 255].
    pub fn from_f64(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.round().clamp(0.0, 255.0) as u8,
            g: g.round().clamp(0.0, 255.0) as u8,
            b: b.round().clamp(0.0, 255.0) as u8,
        }
    }

    /// Mean channel brightness in [0, 255].
    pub fn brightness(&self) -> f64 {
        (self.r as f64 + self.g as f64 + self.b as f64) / 3.0
    }

    /// Brightness normalized to [0, 1].
    pub fn intensity(&self) -> f64 {
        self.brightness() / 255.0
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_hsv(&self) -> HsvColor {
        rgb_to_hsv(*self)
    }
}

/// Hue in degrees [0, 360), saturation and value as percentages [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvColor {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl HsvColor {
    pub fn new(hue: f64, saturation: f64, value: f64) -> Self {
        Self {
            hue: hue.rem_euclid(360.0),
            saturation: saturation.clamp(0.0, 100.0),
            value: value.clamp(0.0, 100.0),
        }
    }

    pub fn to_rgb(&self) -> RgbColor {
        hsv_to_rgb(*self)
    }
}

/// Standard RGB to HSV conversion. Hue is undefined for achromatic input
/// (max == min) and is reported as 0.
pub fn rgb_to_hsv(rgb: RgbColor) -> HsvColor {
    let r = rgb.r as f64 / 255.0;
    let g = rgb.g as f64 / 255.0;
    let b = rgb.b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    HsvColor {
        hue: hue.rem_euclid(360.0),
        saturation: saturation * 100.0,
        value: max * 100.0,
    }
}

/// Six-sector HSV to RGB conversion.
pub fn hsv_to_rgb(hsv: HsvColor) -> RgbColor {
    let s = (hsv.saturation / 100.0).clamp(0.0, 1.0);
    let v = (hsv.value / 100.0).clamp(0.0, 1.0);
    let h = hsv.hue.rem_euclid(360.0) / 60.0;

    let sector = (h.floor() as u32) % 6;
    let f = h - h.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    RgbColor::from_f64(r * 255.0, g * 255.0, b * 255.0)
}
