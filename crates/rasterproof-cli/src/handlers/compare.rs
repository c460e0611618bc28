//! Compare command handler

use crate::commands::CompareArgs;
use crate::error::{CliError, CliResult};
use rasterproof::compare::diff_rasters;
use rasterproof::raster::files_identical;
use rasterproof::{
    load_raster, DirectoryComparison, PerceptualComparator, RasterDiff, ToleranceProfile,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Outcome of `rasterproof compare`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareReport {
    /// First operand
    pub left: PathBuf,
    /// Second operand
    pub right: PathBuf,
    /// Tolerance used
    pub tolerance: ToleranceProfile,
    /// Verdict
    pub equal: bool,
    /// Directory verdict, `None` for two files
    pub pages: Option<DirectoryComparison>,
    /// Pixel statistics of the compared (or first differing) file pair,
    /// `None` when the files are byte-identical or no pair was compared
    pub diff: Option<RasterDiff>,
}

/// Compare two image files or two page directories
///
/// # Errors
///
/// Returns an error when an operand is missing, the operands are of
/// different kinds, or an image cannot be decoded
pub fn execute_compare(args: &CompareArgs) -> CliResult<CompareReport> {
    let tolerance = args.tolerance.apply(ToleranceProfile::IDENTITY);
    tolerance.validate()?;
    let comparator = PerceptualComparator::new(tolerance);

    for path in [&args.left, &args.right] {
        if !path.exists() {
            return Err(CliError::invalid_argument(format!("{} does not exist", path.display())));
        }
    }

    let mut report = CompareReport {
        left: args.left.clone(),
        right: args.right.clone(),
        tolerance,
        equal: false,
        pages: None,
        diff: None,
    };

    match (args.left.is_dir(), args.right.is_dir()) {
        (true, true) => {
            let naming = args.pages.naming();
            let pages = comparator.directories_equal(&args.left, &args.right, &naming)?;
            report.equal = pages.is_equal();
            if let DirectoryComparison::PageDiffers { left, right, .. } = &pages {
                report.diff = file_diff(left, right)?;
            }
            report.pages = Some(pages);
        }
        (false, false) => {
            report.equal = comparator.files_equal(&args.left, &args.right)?;
            report.diff = file_diff(&args.left, &args.right)?;
        }
        _ => {
            return Err(CliError::invalid_argument(
                "compare needs two files or two directories",
            ))
        }
    }
    Ok(report)
}

fn file_diff(left: &Path, right: &Path) -> CliResult<Option<RasterDiff>> {
    if files_identical(left, right)? {
        return Ok(None);
    }
    Ok(Some(diff_rasters(&load_raster(left)?, &load_raster(right)?)))
}

/// Render a compare report as text
#[must_use]
pub fn render_compare_text(report: &CompareReport) -> String {
    let mut out = String::new();
    let verdict = if report.equal { "EQUAL" } else { "DIFFERENT" };
    let _ = writeln!(
        out,
        "{verdict}: {} vs {}",
        report.left.display(),
        report.right.display()
    );
    let _ = writeln!(
        out,
        "  tolerance: frac_pixels={} mean_distance={}",
        report.tolerance.frac_pixels, report.tolerance.mean_distance
    );

    match &report.pages {
        Some(DirectoryComparison::Equal { pages }) => {
            let _ = writeln!(out, "  pages: {pages}");
        }
        Some(DirectoryComparison::PageCountMismatch { left, right }) => {
            let _ = writeln!(out, "  page count: {left} vs {right}");
        }
        Some(DirectoryComparison::PageDiffers { index, left, right }) => {
            let _ = writeln!(
                out,
                "  first differing page #{}: {} vs {}",
                index + 1,
                left.display(),
                right.display()
            );
        }
        None => {}
    }

    match &report.diff {
        None if report.pages.is_none() => {
            let _ = writeln!(out, "  files are byte-identical");
        }
        None | Some(RasterDiff::Identical) => {}
        Some(RasterDiff::DimensionMismatch { a, b }) => {
            let _ = writeln!(out, "  dimensions: {}x{} vs {}x{}", a.0, a.1, b.0, b.1);
        }
        Some(RasterDiff::Different(stats)) => {
            let largest: Vec<String> = stats.largest.iter().map(|v| format!("{v:.2}")).collect();
            let _ = writeln!(
                out,
                "  differing: {}/{} ({:.6}) mean={:.3} largest=[{}]",
                stats.differing,
                stats.total,
                stats.fraction,
                stats.mean,
                largest.join(", ")
            );
        }
    }
    out
}
