//! Pure color-science math shared by every processing backend.

pub mod space;
pub mod wavelength;

pub use space::{hsv_to_rgb, rgb_to_hsv, HsvColor, RgbColor};
pub use wavelength::{
    hue_to_wavelength, reference_patches, wavelength_to_color_name, wavelength_to_rgb, ChartPatch,
};
