//! Black-box image boundary.
//!
//! Decoding, encoding and pixel storage are delegated to the `image` crate;
//! the rest of the crate only ever sees a [`PixelGrid`] of RGB triples or an
//! opaque [`ImageHandle`].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::color::RgbColor;
use crate::error::ProcessingError;

/// A decoded width x height grid of RGB pixels, row major.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<RgbColor>,
}

impl PixelGrid {
    /// Build a uniform grid of one color. Mostly useful for tests and
    /// synthetic inputs.
    pub fn filled(width: u32, height: u32, color: RgbColor) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width as usize) * (height as usize)],
        }
    }

    pub fn from_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image
            .pixels()
            .map(|p| RgbColor::new(p[0], p[1], p[2]))
            .collect();
        Self { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel access with coordinates clamped to the grid bounds, so callers
    /// can never index out of range.
    pub fn get_clamped(&self, x: i64, y: i64) -> RgbColor {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.pixels[y * self.width as usize + x]
    }

    /// Set a pixel, ignoring out-of-bounds coordinates. Used by tests to
    /// paint synthetic charts.
    pub fn set(&mut self, x: u32, y: u32, color: RgbColor) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = color;
        }
    }

    pub fn to_image(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for (i, px) in self.pixels.iter().enumerate() {
            let x = (i as u32) % self.width;
            let y = (i as u32) / self.width;
            out.put_pixel(x, y, image::Rgb([px.r, px.g, px.b]));
        }
        out
    }
}

/// Reference to the image a backend should process.
///
/// A handle may carry decoded pixels, the original encoded bytes, a backing
/// file path, or just a logical URI; each backend uses whichever form it
/// needs and reports `Unavailable` when the handle cannot supply it.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    uri: String,
    path: Option<PathBuf>,
    grid: Option<PixelGrid>,
    encoded: Option<Vec<u8>>,
}

impl ImageHandle {
    /// Read and decode an image file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProcessingError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| ProcessingError::Execution {
            reason: format!("failed to read image {}: {e}", path.display()),
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| ProcessingError::Execution {
            reason: format!("failed to decode image {}: {e}", path.display()),
        })?;
        Ok(Self {
            uri: path.display().to_string(),
            path: Some(path.to_path_buf()),
            grid: Some(PixelGrid::from_image(&decoded.to_rgb8())),
            encoded: Some(bytes),
        })
    }

    /// Wrap an already-decoded pixel grid.
    pub fn from_grid(uri: impl Into<String>, grid: PixelGrid) -> Self {
        Self {
            uri: uri.into(),
            path: None,
            grid: Some(grid),
            encoded: None,
        }
    }

    /// A reference-only handle with no pixel data attached.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            path: None,
            grid: None,
            encoded: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pixels(&self) -> Option<&PixelGrid> {
        self.grid.as_ref()
    }

    /// Encoded bytes suitable for the remote payload. Falls back to a JPEG
    /// encode of the decoded grid when no original bytes are attached.
    pub fn encoded_jpeg(&self) -> Result<Vec<u8>, ProcessingError> {
        if let Some(bytes) = &self.encoded {
            return Ok(bytes.clone());
        }
        let grid = self.grid.as_ref().ok_or_else(|| ProcessingError::Execution {
            reason: format!("image {} carries no pixel data to encode", self.uri),
        })?;
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(grid.to_image())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .map_err(|e| ProcessingError::Execution {
                reason: format!("failed to encode image {}: {e}", self.uri),
            })?;
        Ok(buf)
    }
}
