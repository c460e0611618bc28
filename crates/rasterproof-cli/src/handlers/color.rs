//! Color command handler

use crate::commands::ColorArgs;
use crate::error::{CliError, CliResult};
use rasterproof::{load_raster, ColorClassifier, ColorSummary};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Color statistics of one colored page file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageColor {
    /// Page file
    pub file: PathBuf,
    /// Page number parsed from the file name
    pub page: Option<u32>,
    /// Colored-pixel statistics
    pub summary: ColorSummary,
}

/// Outcome of `rasterproof color`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorReport {
    /// Image or directory inspected
    pub path: PathBuf,
    /// Color score threshold
    pub threshold: f64,
    /// Whether any page has color
    pub colored: bool,
    /// Colored page numbers
    pub pages: BTreeSet<u32>,
    /// Statistics for each colored page
    pub details: Vec<PageColor>,
}

/// Classify an image file or every page of a directory
///
/// # Errors
///
/// Returns an error when the path is missing, the threshold is negative, or
/// an image cannot be decoded or a marked image written
pub fn execute_color(args: &ColorArgs) -> CliResult<ColorReport> {
    if !args.path.exists() {
        return Err(CliError::invalid_argument(format!(
            "{} does not exist",
            args.path.display()
        )));
    }
    if args.threshold.is_nan() || args.threshold < 0.0 {
        return Err(CliError::invalid_argument(format!(
            "threshold must be non-negative, got {}",
            args.threshold
        )));
    }

    let classifier = ColorClassifier::new(args.threshold);
    let naming = args.pages.naming();
    let mark_dir = args.mark.as_deref();

    let (pages, colored_files) = if args.path.is_dir() {
        let pages = classifier.color_directory_pages(&args.path, &naming, mark_dir)?;
        let files: Vec<PathBuf> = naming
            .list_pages(&args.path)?
            .into_iter()
            .filter(|f| naming.page_number(f).is_some_and(|n| pages.contains(&n)))
            .collect();
        (pages, files)
    } else if classifier.is_color_file(&args.path, mark_dir)? {
        let pages = naming.page_number(&args.path).into_iter().collect();
        (pages, vec![args.path.clone()])
    } else {
        (BTreeSet::new(), Vec::new())
    };

    let mut details = Vec::with_capacity(colored_files.len());
    for file in colored_files {
        let (_, summary) = classifier.mark_color(&load_raster(&file)?);
        details.push(PageColor {
            page: naming.page_number(&file),
            file,
            summary,
        });
    }

    Ok(ColorReport {
        path: args.path.clone(),
        threshold: args.threshold,
        colored: !details.is_empty(),
        pages,
        details,
    })
}

/// Render a color report as text
#[must_use]
pub fn render_color_text(report: &ColorReport) -> String {
    let mut out = String::new();
    if report.colored {
        let pages: Vec<String> = report.pages.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "COLOR: {} (pages: {})",
            report.path.display(),
            if pages.is_empty() { "-".to_string() } else { pages.join(",") }
        );
    } else {
        let _ = writeln!(out, "GRAY: {}", report.path.display());
    }
    for detail in &report.details {
        let _ = writeln!(out, "  {}: {}", detail.file.display(), detail.summary);
    }
    out
}
