//! Perceptual raster comparison.
//!
//! Two rasters are equal when they have the same dimensions and the pixels
//! that differ are both few enough and close enough under a
//! [`ToleranceProfile`]. Each differing pixel contributes one diff sample: the
//! Euclidean RGB distance rescaled to 0..255 and divided by three, which
//! approximates a grayscale delta.

use crate::pages::PageNaming;
use crate::raster::{files_identical, load_raster, Raster, SAMPLE_MAX};
use crate::result::RasterproofResult;
use crate::tolerance::ToleranceProfile;
use image::Rgb;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Number of largest diff samples kept for diagnostics
pub const MAX_REPORTED_SAMPLES: usize = 10;

/// Statistics over the pixels that differ between two rasters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffStats {
    /// Number of differing pixels
    pub differing: usize,
    /// Total number of pixels compared
    pub total: usize,
    /// Fraction of pixels that differ (0.0-1.0)
    pub fraction: f64,
    /// Mean diff sample over differing pixels (0-255)
    pub mean: f64,
    /// Largest diff samples, descending, at most [`MAX_REPORTED_SAMPLES`]
    pub largest: Vec<f64>,
}

impl DiffStats {
    /// Whether these differences are inside `tolerance`
    #[must_use]
    pub fn within(&self, tolerance: &ToleranceProfile) -> bool {
        self.fraction <= tolerance.frac_pixels && self.mean <= tolerance.mean_distance
    }
}

/// Outcome of diffing two rasters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RasterDiff {
    /// Every pixel matches exactly
    Identical,
    /// Rasters have different shapes and cannot be compared pixel by pixel
    DimensionMismatch {
        /// (width, height) of the first raster
        a: (u32, u32),
        /// (width, height) of the second raster
        b: (u32, u32),
    },
    /// Some pixels differ
    Different(DiffStats),
}

impl RasterDiff {
    /// Whether this outcome counts as equal under `tolerance`
    #[must_use]
    pub fn within(&self, tolerance: &ToleranceProfile) -> bool {
        match self {
            Self::Identical => true,
            Self::DimensionMismatch { .. } => false,
            Self::Different(stats) => stats.within(tolerance),
        }
    }

    /// Difference statistics, if any pixel differs
    #[must_use]
    pub const fn stats(&self) -> Option<&DiffStats> {
        match self {
            Self::Different(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Diff sample for one pixel pair on the 0..255 scale
#[must_use]
pub fn diff_sample(a: Rgb<u16>, b: Rgb<u16>) -> f64 {
    let Rgb([r1, g1, b1]) = a;
    let Rgb([r2, g2, b2]) = b;

    let dr = f64::from(r1) - f64::from(r2);
    let dg = f64::from(g1) - f64::from(g2);
    let db = f64::from(b1) - f64::from(b2);

    let distance = (dr * dr + dg * dg + db * db).sqrt();
    distance / SAMPLE_MAX * 255.0 / 3.0
}

/// Diff two rasters pixel by pixel.
#[must_use]
pub fn diff_rasters(a: &Raster, b: &Raster) -> RasterDiff {
    if a.dimensions() != b.dimensions() {
        return RasterDiff::DimensionMismatch {
            a: a.dimensions(),
            b: b.dimensions(),
        };
    }

    let mut samples: Vec<f64> = a
        .pixels()
        .zip(b.pixels())
        .filter(|(pa, pb)| pa != pb)
        .map(|(pa, pb)| diff_sample(*pa, *pb))
        .collect();

    if samples.is_empty() {
        return RasterDiff::Identical;
    }

    let (width, height) = a.dimensions();
    let total = width as usize * height as usize;
    let differing = samples.len();
    let mean = samples.iter().sum::<f64>() / differing as f64;

    samples.sort_unstable_by(|x, y| y.total_cmp(x));
    samples.truncate(MAX_REPORTED_SAMPLES);

    RasterDiff::Different(DiffStats {
        differing,
        total,
        fraction: differing as f64 / total as f64,
        mean,
        largest: samples,
    })
}

/// Result of comparing two directories of page rasters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryComparison {
    /// Same page count and every page pair equal
    Equal {
        /// Number of pages compared
        pages: usize,
    },
    /// The directories hold different numbers of pages
    PageCountMismatch {
        /// Pages in the first directory
        left: usize,
        /// Pages in the second directory
        right: usize,
    },
    /// The first page pair that is not equal
    PageDiffers {
        /// Position in page order (0-based)
        index: usize,
        /// Page file from the first directory
        left: PathBuf,
        /// Page file from the second directory
        right: PathBuf,
    },
}

impl DirectoryComparison {
    /// Whether the directories were judged equal
    #[must_use]
    pub const fn is_equal(&self) -> bool {
        matches!(self, Self::Equal { .. })
    }
}

/// Compares rasters, image files and page directories under one tolerance
#[derive(Debug, Clone, Default)]
pub struct PerceptualComparator {
    tolerance: ToleranceProfile,
}

impl PerceptualComparator {
    /// Create a comparator
    #[must_use]
    pub const fn new(tolerance: ToleranceProfile) -> Self {
        Self { tolerance }
    }

    /// Get the tolerance
    #[must_use]
    pub const fn tolerance(&self) -> &ToleranceProfile {
        &self.tolerance
    }

    /// Diff two rasters without judging them
    #[must_use]
    pub fn diff(&self, a: &Raster, b: &Raster) -> RasterDiff {
        diff_rasters(a, b)
    }

    /// Judge two rasters, logging a diagnostic when they are not equal
    #[must_use]
    pub fn compare(&self, a: &Raster, b: &Raster) -> bool {
        let diff = diff_rasters(a, b);
        let equal = diff.within(&self.tolerance);
        if !equal {
            report_inequality(&diff, a.dimensions());
        }
        equal
    }

    /// Judge two image files. Byte-identical files are equal without decoding.
    ///
    /// # Errors
    ///
    /// Returns `ImageDecode` if either file cannot be read or decoded
    pub fn files_equal(&self, a: &Path, b: &Path) -> RasterproofResult<bool> {
        if files_identical(a, b)? {
            return Ok(true);
        }
        let raster_a = load_raster(a)?;
        let raster_b = load_raster(b)?;
        let equal = self.compare(&raster_a, &raster_b);
        if !equal {
            tracing::warn!(left = %a.display(), right = %b.display(), "page rasters differ");
        }
        Ok(equal)
    }

    /// Judge two directories of page rasters named by `naming`.
    ///
    /// A page count mismatch is reported without comparing any file. Pages are
    /// paired in page-number order and the first unequal pair stops the scan.
    ///
    /// # Errors
    ///
    /// Returns `ImageDecode` if a page file cannot be decoded
    pub fn directories_equal(
        &self,
        dir_a: &Path,
        dir_b: &Path,
        naming: &PageNaming,
    ) -> RasterproofResult<DirectoryComparison> {
        let pages_a = naming.list_pages(dir_a)?;
        let pages_b = naming.list_pages(dir_b)?;

        if pages_a.len() != pages_b.len() {
            tracing::warn!(
                left = pages_a.len(),
                right = pages_b.len(),
                "page counts differ"
            );
            return Ok(DirectoryComparison::PageCountMismatch {
                left: pages_a.len(),
                right: pages_b.len(),
            });
        }

        for (index, (a, b)) in pages_a.iter().zip(&pages_b).enumerate() {
            if !self.files_equal(a, b)? {
                return Ok(DirectoryComparison::PageDiffers {
                    index,
                    left: a.clone(),
                    right: b.clone(),
                });
            }
        }

        Ok(DirectoryComparison::Equal {
            pages: pages_a.len(),
        })
    }
}

fn report_inequality(diff: &RasterDiff, (width, height): (u32, u32)) {
    match diff {
        RasterDiff::DimensionMismatch { a, b } => {
            tracing::warn!(
                "different dimensions: {}x{} vs {}x{}",
                a.0,
                a.1,
                b.0,
                b.1
            );
        }
        RasterDiff::Different(stats) => {
            let largest: Vec<String> = stats.largest.iter().map(|d| format!("{d:.0}")).collect();
            tracing::warn!(
                different = stats.differing,
                width,
                height,
                fraction = stats.fraction,
                mean = stats.mean,
                "different pixels: {}/({}x{})={:e} mean={:.1} largest=[{}]",
                stats.differing,
                width,
                height,
                stats.fraction,
                stats.mean,
                largest.join(" ")
            );
        }
        RasterDiff::Identical => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::raster::solid_raster;
    use image::{Rgba, RgbaImage};

    fn write_png(path: &Path, w: u32, h: u32, rgb: [u8; 3]) {
        let img = RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]));
        img.save(path).unwrap();
    }

    mod sample_tests {
        use super::*;

        #[test]
        fn test_identical_pixels_zero() {
            let p = Rgb([100, 200, 300]);
            assert!(diff_sample(p, p).abs() < f64::EPSILON);
        }

        #[test]
        fn test_full_scale_delta() {
            let black = Rgb([0, 0, 0]);
            let white = Rgb([65535, 65535, 65535]);
            let expected = 3f64.sqrt() * 255.0 / 3.0;
            assert!((diff_sample(black, white) - expected).abs() < 1e-9);
        }

        #[test]
        fn test_single_channel_delta() {
            let black = Rgb([0, 0, 0]);
            let red = Rgb([65535, 0, 0]);
            assert!((diff_sample(black, red) - 85.0).abs() < 1e-9);
        }
    }

    mod raster_tests {
        use super::*;

        #[test]
        fn test_identical_black_rasters() {
            let a = solid_raster(10, 10, [0, 0, 0]);
            let b = solid_raster(10, 10, [0, 0, 0]);
            let cmp = PerceptualComparator::new(ToleranceProfile::EXACT);
            assert_eq!(cmp.diff(&a, &b), RasterDiff::Identical);
            assert!(cmp.compare(&a, &b));
        }

        #[test]
        fn test_one_pixel_full_scale_difference() {
            let a = solid_raster(10, 10, [0, 0, 0]);
            let mut b = a.clone();
            b.put_pixel(3, 4, Rgb([65535, 65535, 65535]));

            let lenient = PerceptualComparator::new(ToleranceProfile::new(0.02, 255.0));
            assert!(lenient.compare(&a, &b));

            let strict = PerceptualComparator::new(ToleranceProfile::EXACT);
            assert!(!strict.compare(&a, &b));

            let stats = diff_rasters(&a, &b);
            let stats = stats.stats().unwrap();
            assert_eq!(stats.differing, 1);
            assert_eq!(stats.total, 100);
            assert!((stats.fraction - 0.01).abs() < f64::EPSILON);
            assert_eq!(stats.largest.len(), 1);
        }

        #[test]
        fn test_fraction_and_mean_both_required() {
            let a = solid_raster(10, 10, [0, 0, 0]);
            let mut b = a.clone();
            b.put_pixel(0, 0, Rgb([65535, 65535, 65535]));
            // fraction passes, mean fails
            assert!(!PerceptualComparator::new(ToleranceProfile::new(0.5, 10.0)).compare(&a, &b));
            // mean passes, fraction fails
            let strict = PerceptualComparator::new(ToleranceProfile::new(0.001, 255.0));
            assert!(!strict.compare(&a, &b));
        }

        #[test]
        fn test_dimension_mismatch_is_verdict_not_error() {
            let a = solid_raster(2, 2, [0, 0, 0]);
            let b = solid_raster(3, 3, [0, 0, 0]);
            let diff = diff_rasters(&a, &b);
            assert_eq!(
                diff,
                RasterDiff::DimensionMismatch {
                    a: (2, 2),
                    b: (3, 3)
                }
            );
            assert!(!diff.within(&ToleranceProfile::new(1.0, 255.0)));
        }

        #[test]
        fn test_largest_samples_capped_and_sorted() {
            let a = solid_raster(20, 1, [0, 0, 0]);
            let mut b = a.clone();
            for x in 0..20 {
                let v = (x as u16 + 1) * 1000;
                b.put_pixel(x, 0, Rgb([v, v, v]));
            }
            let diff = diff_rasters(&a, &b);
            let stats = diff.stats().unwrap();
            assert_eq!(stats.differing, 20);
            assert_eq!(stats.largest.len(), MAX_REPORTED_SAMPLES);
            assert!(stats.largest.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_byte_identical_files_short_circuit() {
            let dir = tempfile::tempdir().unwrap();
            // Not decodable, but identical bytes never reach the decoder.
            let a = dir.path().join("a.png");
            let b = dir.path().join("b.png");
            std::fs::write(&a, b"opaque").unwrap();
            std::fs::write(&b, b"opaque").unwrap();
            let cmp = PerceptualComparator::new(ToleranceProfile::EXACT);
            assert!(cmp.files_equal(&a, &b).unwrap());
        }

        #[test]
        fn test_decode_failure_propagates() {
            let dir = tempfile::tempdir().unwrap();
            let a = dir.path().join("a.png");
            let b = dir.path().join("b.png");
            std::fs::write(&a, b"garbage-a").unwrap();
            std::fs::write(&b, b"garbage-b").unwrap();
            let cmp = PerceptualComparator::default();
            assert!(cmp.files_equal(&a, &b).is_err());
        }

        #[test]
        fn test_directories_equal() {
            let dir = tempfile::tempdir().unwrap();
            let left = dir.path().join("1");
            let right = dir.path().join("2");
            std::fs::create_dir_all(&left).unwrap();
            std::fs::create_dir_all(&right).unwrap();
            let naming = PageNaming::default();
            for page in 1..=2 {
                write_png(&left.join(naming.file_name(page)), 4, 4, [10, 10, 10]);
                write_png(&right.join(naming.file_name(page)), 4, 4, [10, 10, 10]);
            }
            let cmp = PerceptualComparator::new(ToleranceProfile::EXACT);
            assert_eq!(
                cmp.directories_equal(&left, &right, &naming).unwrap(),
                DirectoryComparison::Equal { pages: 2 }
            );
        }

        #[test]
        fn test_directories_page_count_mismatch() {
            let dir = tempfile::tempdir().unwrap();
            let left = dir.path().join("1");
            let right = dir.path().join("2");
            std::fs::create_dir_all(&left).unwrap();
            std::fs::create_dir_all(&right).unwrap();
            let naming = PageNaming::default();
            write_png(&left.join(naming.file_name(1)), 4, 4, [0, 0, 0]);
            write_png(&left.join(naming.file_name(2)), 4, 4, [0, 0, 0]);
            // A broken file on the right is never decoded: counts differ first.
            std::fs::write(right.join(naming.file_name(1)), b"broken").unwrap();

            let cmp = PerceptualComparator::default();
            let result = cmp.directories_equal(&left, &right, &naming).unwrap();
            assert_eq!(
                result,
                DirectoryComparison::PageCountMismatch { left: 2, right: 1 }
            );
            assert!(!result.is_equal());
        }

        #[test]
        fn test_directories_first_differing_page() {
            let dir = tempfile::tempdir().unwrap();
            let left = dir.path().join("1");
            let right = dir.path().join("2");
            std::fs::create_dir_all(&left).unwrap();
            std::fs::create_dir_all(&right).unwrap();
            let naming = PageNaming::default();
            write_png(&left.join(naming.file_name(1)), 4, 4, [0, 0, 0]);
            write_png(&right.join(naming.file_name(1)), 4, 4, [0, 0, 0]);
            write_png(&left.join(naming.file_name(2)), 4, 4, [0, 0, 0]);
            write_png(&right.join(naming.file_name(2)), 4, 4, [255, 255, 255]);

            let cmp = PerceptualComparator::new(ToleranceProfile::IDENTITY);
            match cmp.directories_equal(&left, &right, &naming).unwrap() {
                DirectoryComparison::PageDiffers { index, left, .. } => {
                    assert_eq!(index, 1);
                    assert!(left.ends_with("doc-002.png"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
