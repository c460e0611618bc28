//! Color vs grayscale classification of page rasters.
//!
//! A pixel is colored when `|R-G| + |G-B|`, rescaled to 0..255, exceeds the
//! classifier threshold. Two scans are offered with different contracts:
//!
//! - [`ColorClassifier::is_color`] stops at the first colored pixel and only
//!   answers yes/no.
//! - [`ColorClassifier::mark_color`] always scans the whole raster and returns a
//!   marker image plus a [`ColorSummary`] for triage.

use crate::pages::PageNaming;
use crate::raster::{load_raster, save_png, Raster, SAMPLE_MAX};
use crate::result::RasterproofResult;
use image::{Rgb, Rgba, RgbaImage};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default color threshold on the 0..255 scale
pub const DEFAULT_COLOR_THRESHOLD: f64 = 5.0;

/// Marker painted on colored pixels in diagnostic images
pub const MARKER_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Background of diagnostic images
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Color score of one pixel on the 0..255 scale
#[must_use]
pub fn color_score(px: Rgb<u16>) -> f64 {
    let Rgb([r, g, b]) = px;
    let rg = (i32::from(r) - i32::from(g)).unsigned_abs();
    let gb = (i32::from(g) - i32::from(b)).unsigned_abs();
    f64::from(rg + gb) / SAMPLE_MAX * 255.0
}

/// Summary of the color scores of colored pixels
///
/// `min`, `mean` and `max` are `None` when no pixel is colored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColorSummary {
    /// Number of colored pixels
    pub count: usize,
    /// Smallest color score
    pub min: Option<f64>,
    /// Mean color score
    pub mean: Option<f64>,
    /// Largest color score
    pub max: Option<f64>,
}

impl ColorSummary {
    fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        Self {
            count: scores.len(),
            min: Some(min),
            mean: Some(mean),
            max: Some(max),
        }
    }

    /// Whether any pixel was colored
    #[must_use]
    pub const fn has_color(&self) -> bool {
        self.count > 0
    }
}

impl fmt::Display for ColorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.mean, self.max) {
            (Some(min), Some(mean), Some(max)) => write!(
                f,
                "n={} min={min:.3} mean={mean:.3} max={max:.3}",
                self.count
            ),
            _ => write!(f, "n={} (no data)", self.count),
        }
    }
}

/// Classifies rasters, image files and page directories as color or gray
#[derive(Debug, Clone)]
pub struct ColorClassifier {
    threshold: f64,
}

impl Default for ColorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR_THRESHOLD)
    }
}

impl ColorClassifier {
    /// Create a classifier with a threshold on the 0..255 scale
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Get the threshold
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `px` counts as colored
    #[must_use]
    pub fn is_colored_pixel(&self, px: Rgb<u16>) -> bool {
        color_score(px) > self.threshold
    }

    /// Whether any pixel is colored. Scans row-major and returns at the first hit.
    #[must_use]
    pub fn is_color(&self, img: &Raster) -> bool {
        img.pixels().any(|px| self.is_colored_pixel(*px))
    }

    /// Scan every pixel, painting colored ones with [`MARKER_COLOR`] on a white
    /// image of the same bounds.
    #[must_use]
    pub fn mark_color(&self, img: &Raster) -> (RgbaImage, ColorSummary) {
        let (width, height) = img.dimensions();
        let mut marked = RgbaImage::from_pixel(width, height, BACKGROUND);
        let mut scores = Vec::new();

        for (x, y, px) in img.enumerate_pixels() {
            let score = color_score(*px);
            if score > self.threshold {
                marked.put_pixel(x, y, MARKER_COLOR);
                scores.push(score);
            }
        }

        (marked, ColorSummary::from_scores(&scores))
    }

    /// Whether the image file at `path` has color.
    ///
    /// When `mark_dir` is given and the image has color, a marked diagnostic
    /// image `<stem>.marked.png` is written there.
    ///
    /// # Errors
    ///
    /// Returns `ImageDecode` / `ImageEncode` on codec failures
    pub fn is_color_file(&self, path: &Path, mark_dir: Option<&Path>) -> RasterproofResult<bool> {
        let img = load_raster(path)?;
        let is_color = self.is_color(&img);
        if is_color {
            if let Some(dir) = mark_dir {
                let marked_path = marked_path(path, dir);
                let (marked, summary) = self.mark_color(&img);
                std::fs::create_dir_all(dir)?;
                tracing::warn!(marked = %marked_path.display(), "{summary}");
                save_png(&marked_path, &marked)?;
            }
        }
        Ok(is_color)
    }

    /// Whether any page file in `dir` has color. Stops at the first colored page.
    ///
    /// # Errors
    ///
    /// Returns `ImageDecode` if a page cannot be decoded
    pub fn is_color_directory(&self, dir: &Path, naming: &PageNaming) -> RasterproofResult<bool> {
        for path in naming.list_pages(dir)? {
            if self.is_color_file(&path, None)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Page numbers of every colored page file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `ImageDecode` / `ImageEncode` on codec failures
    pub fn color_directory_pages(
        &self,
        dir: &Path,
        naming: &PageNaming,
        mark_dir: Option<&Path>,
    ) -> RasterproofResult<BTreeSet<u32>> {
        let mut pages = BTreeSet::new();
        for path in naming.list_pages(dir)? {
            let Some(page) = naming.page_number(&path) else {
                continue;
            };
            if self.is_color_file(&path, mark_dir)? {
                pages.insert(page);
            }
        }
        Ok(pages)
    }
}

fn marked_path(path: &Path, dir: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "page".into(), |s| s.to_string_lossy());
    dir.join(format!("{stem}.marked.png"))
}
