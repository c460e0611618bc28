//! Raster loading and saving.
//!
//! Every page image is decoded into a 16-bit-per-channel RGB buffer so that
//! 8-bit and 16-bit renderer output share one sample scale (0..=0xFFFF).

use crate::result::{RasterproofError, RasterproofResult};
use image::{ImageBuffer, Rgb, RgbaImage};
use std::path::Path;

/// Decoded page raster with 16-bit RGB samples
pub type Raster = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// Full-scale sample value
pub const SAMPLE_MAX: f64 = 65535.0;

/// Load an image file as a [`Raster`].
///
/// # Errors
///
/// Returns `ImageDecode` if the file cannot be opened or decoded
pub fn load_raster(path: &Path) -> RasterproofResult<Raster> {
    let img = image::open(path).map_err(|e| RasterproofError::ImageDecode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(img.into_rgb16())
}

/// Write a diagnostic image as PNG.
///
/// # Errors
///
/// Returns `ImageEncode` if the file cannot be written
pub fn save_png(path: &Path, img: &RgbaImage) -> RasterproofResult<()> {
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| RasterproofError::ImageEncode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Whether two encoded files are byte-identical.
///
/// # Errors
///
/// Returns `ImageDecode` if either file cannot be read
pub fn files_identical(a: &Path, b: &Path) -> RasterproofResult<bool> {
    let read = |p: &Path| {
        std::fs::read(p).map_err(|e| RasterproofError::ImageDecode {
            path: p.to_path_buf(),
            message: e.to_string(),
        })
    };
    let (bytes_a, bytes_b) = (read(a)?, read(b)?);
    Ok(bytes_a == bytes_b)
}

/// Build a raster filled with one 8-bit color (scaled to 16 bits).
#[must_use]
pub fn solid_raster(width: u32, height: u32, rgb: [u8; 3]) -> Raster {
    let px = Rgb(rgb.map(|c| u16::from(c) * 257));
    ImageBuffer::from_pixel(width, height, px)
}
