//! Validation orchestrator.
//!
//! Drives each corpus item through
//!
//! ```text
//! Pending ──transform──► Transformed ──structural check + rasterize──► Rasterized
//!                                                                       │
//!                                        compare / classify ◄───────────┘
//!                                              │
//!                                          Validated ──► Passed | Failed
//! ```
//!
//! Item-level problems become [`Failure`] values on the item's
//! [`ItemVerdict`]. Environment problems ([`RasterproofError::is_fatal`])
//! abort the run. In fail-fast mode the first failed item halts the run.

use crate::collab::{ColorMode, Rasterizer, TransformIntent, Transformer};
use crate::color::ColorClassifier;
use crate::compare::{DirectoryComparison, PerceptualComparator};
use crate::config::HarnessConfig;
use crate::corpus::CorpusItem;
use crate::ledger::{Ledger, TestRecord};
use crate::result::{RasterproofError, RasterproofResult};
use crate::workdir::WorkDir;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Progress of one corpus item through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    /// Not started
    Pending,
    /// Transform produced an output document
    Transformed,
    /// Both documents rendered into page images
    Rasterized,
    /// Judgment computed
    Validated,
    /// Item passed
    Passed,
    /// Item failed
    Failed,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Transformed => "transformed",
            Self::Rasterized => "rasterized",
            Self::Validated => "validated",
            Self::Passed => "passed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transform produced no output
    Transform,
    /// Renderer rejected the output, or it parses with more warnings
    Structural,
    /// A document could not be rendered or a page image decoded
    Rasterize,
    /// Page rasters differ beyond tolerance
    Comparison,
    /// Grayscale output still has colored pages
    ColorPresent,
    /// Colored pages differ from the declared set
    ColorMismatch,
    /// An external tool exceeded its deadline
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transform => "transform",
            Self::Structural => "structural",
            Self::Rasterize => "rasterize",
            Self::Comparison => "comparison",
            Self::ColorPresent => "color-present",
            Self::ColorMismatch => "color-mismatch",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// An item-level failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Failure category
    pub kind: FailureKind,
    /// Human readable detail
    pub message: String,
}

impl Failure {
    /// Create a failure
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one corpus item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemVerdict {
    /// Input document
    pub path: PathBuf,
    /// Test name (input file name)
    pub name: String,
    /// Transformed document
    pub output: PathBuf,
    /// Last pipeline stage completed before the verdict
    pub stage_reached: ItemStage,
    /// Failure, `None` when the item passed
    pub failure: Option<Failure>,
    /// Page count
    pub num_pages: u32,
    /// Transform wall time in seconds
    pub transform_secs: f64,
    /// Input size in bytes
    pub input_size: u64,
    /// Output size in bytes
    pub output_size: u64,
    /// Original renders with color
    pub color_in: bool,
    /// Transformed document renders with color
    pub color_out: bool,
    /// Colored pages of the transformed document (color intents only)
    pub color_pages: BTreeSet<u32>,
    /// Image objects reported by the transform
    pub image_objects: u32,
    /// Form objects reported by the transform
    pub form_objects: u32,
}

impl ItemVerdict {
    fn pending(item: &CorpusItem, output: PathBuf) -> Self {
        Self {
            path: item.path.clone(),
            name: item.name(),
            output,
            stage_reached: ItemStage::Pending,
            failure: None,
            num_pages: 0,
            transform_secs: 0.0,
            input_size: item.size_bytes,
            output_size: 0,
            color_in: false,
            color_out: false,
            color_pages: BTreeSet::new(),
            image_objects: 0,
            form_objects: 0,
        }
    }

    /// Whether the item passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// Terminal stage
    #[must_use]
    pub const fn stage(&self) -> ItemStage {
        if self.passed() {
            ItemStage::Passed
        } else {
            ItemStage::Failed
        }
    }

    /// Output size over input size, `None` for an empty input
    #[must_use]
    pub fn size_ratio(&self) -> Option<f64> {
        (self.input_size > 0).then(|| self.output_size as f64 / self.input_size as f64)
    }

    /// Ledger record for this item
    #[must_use]
    pub fn to_record(&self) -> TestRecord {
        TestRecord::new(&self.name)
            .with_colors(self.color_in, self.color_out)
            .with_pages(self.num_pages)
            .with_duration(self.transform_secs)
            .with_objects(self.image_objects, self.form_objects)
    }
}

/// Receives progress events during a run
pub trait RunObserver {
    /// The run is about to process `total` items
    fn run_started(&mut self, _total: usize) {}
    /// Item `index` is starting
    fn item_started(&mut self, _index: usize, _item: &CorpusItem) {}
    /// Item `index` has a verdict
    fn item_finished(&mut self, _index: usize, _verdict: &ItemVerdict) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Result of a corpus run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Verdicts in processing order
    pub verdicts: Vec<ItemVerdict>,
    /// Stopped early by fail-fast
    pub halted: bool,
    /// Wall time of the run in seconds
    pub duration_secs: f64,
}

impl RunSummary {
    /// Number of passed items
    #[must_use]
    pub fn passed(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed()).count()
    }

    /// Number of failed items
    #[must_use]
    pub fn failed(&self) -> usize {
        self.verdicts.len() - self.passed()
    }

    /// Whether every processed item passed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Failed verdicts in processing order
    pub fn failures(&self) -> impl Iterator<Item = &ItemVerdict> {
        self.verdicts.iter().filter(|v| !v.passed())
    }

    /// Paths of failed items
    #[must_use]
    pub fn bad_list(&self) -> Vec<&Path> {
        self.failures().map(|v| v.path.as_path()).collect()
    }

    /// Write the bad list, one path per line
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written
    pub fn write_bad_list(&self, path: &Path) -> RasterproofResult<()> {
        let mut text = String::new();
        for bad in self.bad_list() {
            text.push_str(&bad.to_string_lossy());
            text.push('\n');
        }
        std::fs::write(path, text)?;
        tracing::info!(path = %path.display(), count = self.failed(), "bad list written");
        Ok(())
    }

    /// Failures tallied per kind
    #[must_use]
    pub fn failure_counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in self.verdicts.iter().filter_map(|v| v.failure.as_ref()) {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    fn passed_verdicts(&self) -> impl Iterator<Item = &ItemVerdict> {
        self.verdicts.iter().filter(|v| v.passed())
    }

    /// Total transform time over passed items
    #[must_use]
    pub fn transform_seconds(&self) -> f64 {
        self.passed_verdicts().map(|v| v.transform_secs).sum()
    }

    /// Mean transform time over passed items
    #[must_use]
    pub fn mean_transform_seconds(&self) -> Option<f64> {
        let passed = self.passed();
        (passed > 0).then(|| self.transform_seconds() / passed as f64)
    }

    /// Total input bytes over passed items
    #[must_use]
    pub fn input_bytes(&self) -> u64 {
        self.passed_verdicts().map(|v| v.input_size).sum()
    }

    /// Total output bytes over passed items
    #[must_use]
    pub fn output_bytes(&self) -> u64 {
        self.passed_verdicts().map(|v| v.output_size).sum()
    }
}

/// Internal split between run-aborting errors and item failures
enum StepError {
    Fatal(RasterproofError),
    Failed(Failure),
}

impl From<Failure> for StepError {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}

/// Classify `err` raised during a step whose failures are of `kind`
fn step_error(kind: FailureKind) -> impl Fn(RasterproofError) -> StepError {
    move |err| match err {
        e if e.is_fatal() => StepError::Fatal(e),
        RasterproofError::Timeout { tool, seconds } => StepError::Failed(Failure::new(
            FailureKind::Timeout,
            format!("{tool} did not finish within {seconds}s"),
        )),
        e => StepError::Failed(Failure::new(kind, e.to_string())),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn describe(comparison: &DirectoryComparison) -> String {
    match comparison {
        DirectoryComparison::Equal { pages } => format!("{pages} pages equal"),
        DirectoryComparison::PageCountMismatch { left, right } => {
            format!("page count differs: original {left}, transformed {right}")
        }
        DirectoryComparison::PageDiffers { index, left, right } => format!(
            "page {} differs: {} vs {}",
            index + 1,
            left.display(),
            right.display()
        ),
    }
}

fn page_list(pages: &BTreeSet<u32>) -> String {
    let list: Vec<String> = pages.iter().map(ToString::to_string).collect();
    format!("[{}]", list.join(","))
}

/// Runs a transform over a corpus and judges every output
#[derive(Debug)]
pub struct Orchestrator<T, R> {
    transformer: T,
    rasterizer: R,
    config: HarnessConfig,
    classifier: ColorClassifier,
}

impl<T: Transformer, R: Rasterizer> Orchestrator<T, R> {
    /// Create an orchestrator
    #[must_use]
    pub fn new(transformer: T, rasterizer: R, config: HarnessConfig) -> Self {
        Self {
            transformer,
            rasterizer,
            config,
            classifier: ColorClassifier::default(),
        }
    }

    /// Replace the color classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: ColorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Process `corpus` in order.
    ///
    /// Passed items are upserted into `ledger` when one is given, and the
    /// ledger is flushed before returning. The bad list is written when the
    /// configuration names a file for it.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (ledger, working directory,
    /// configuration or I/O). Item failures are reported in the summary.
    pub fn run(
        &self,
        corpus: &[CorpusItem],
        mut ledger: Option<&mut Ledger>,
        observer: &mut dyn RunObserver,
    ) -> RasterproofResult<RunSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let mut summary = RunSummary::default();

        tracing::info!(
            items = corpus.len(),
            intent = %self.transformer.intent(),
            run_all = self.config.run_all,
            "starting corpus run"
        );
        observer.run_started(corpus.len());

        for (index, item) in corpus.iter().enumerate() {
            observer.item_started(index, item);
            let verdict = self.validate_item(item)?;

            if let Some(failure) = &verdict.failure {
                tracing::error!(
                    input = %verdict.path.display(),
                    output = %verdict.output.display(),
                    stage = %verdict.stage_reached,
                    "{failure}"
                );
            } else if let Some(ledger) = ledger.as_deref_mut() {
                ledger.upsert(verdict.to_record())?;
            }

            observer.item_finished(index, &verdict);
            let failed = !verdict.passed();
            summary.verdicts.push(verdict);

            if failed && !self.config.run_all {
                tracing::warn!(remaining = corpus.len() - index - 1, "stopping at first failure");
                summary.halted = true;
                break;
            }
        }

        if let Some(ledger) = ledger {
            ledger.flush()?;
        }
        summary.duration_secs = started.elapsed().as_secs_f64();
        if let Some(path) = &self.config.bad_list_path {
            summary.write_bad_list(path)?;
        }

        tracing::info!(
            passed = summary.passed(),
            failed = summary.failed(),
            seconds = summary.duration_secs,
            "corpus run finished"
        );
        Ok(summary)
    }

    /// Process one item.
    ///
    /// # Errors
    ///
    /// Returns only fatal errors; item failures are on the verdict
    pub fn validate_item(&self, item: &CorpusItem) -> RasterproofResult<ItemVerdict> {
        let name = item.name();
        let output = self.config.output_dir.join(&name);
        let mut verdict = ItemVerdict::pending(item, output);

        tracing::info!(input = %item.path.display(), size = item.size_bytes, "validating");
        match self.process(item, &mut verdict) {
            Ok(()) => Ok(verdict),
            Err(StepError::Failed(failure)) => {
                verdict.failure = Some(failure);
                Ok(verdict)
            }
            Err(StepError::Fatal(err)) => Err(err),
        }
    }

    fn process(&self, item: &CorpusItem, verdict: &mut ItemVerdict) -> Result<(), StepError> {
        let output = verdict.output.clone();
        if same_file(&item.path, &output) {
            return Err(StepError::Fatal(RasterproofError::OutputOverwritesInput {
                path: item.path.clone(),
            }));
        }
        let fatal = |e: std::io::Error| StepError::Fatal(e.into());
        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            StepError::Fatal(RasterproofError::WorkDir {
                path: self.config.output_dir.clone(),
                message: e.to_string(),
            })
        })?;
        if output.exists() {
            std::fs::remove_file(&output).map_err(fatal)?;
        }

        // Pending -> Transformed
        let started = Instant::now();
        let stats = self
            .transformer
            .transform(&item.path, &output)
            .map_err(step_error(FailureKind::Transform))?;
        verdict.transform_secs = started.elapsed().as_secs_f64();
        verdict.image_objects = stats.image_objects;
        verdict.form_objects = stats.form_objects;
        verdict.output_size = match std::fs::metadata(&output) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Failure::new(
                    FailureKind::Transform,
                    format!("transform produced no output at {}", output.display()),
                )
                .into());
            }
            Err(e) => return Err(fatal(e)),
        };
        verdict.stage_reached = ItemStage::Transformed;
        tracing::debug!(
            output = %output.display(),
            seconds = verdict.transform_secs,
            "transform finished"
        );

        self.check_structure(&item.path, &output)?;

        // Transformed -> Rasterized
        let work = WorkDir::create(
            &self.config.output_dir,
            &verdict.name,
            self.config.keep_intermediates,
        )
        .map_err(StepError::Fatal)?;
        let original_dir = work.subdir("original").map_err(StepError::Fatal)?;
        let transformed_dir = work.subdir("transformed").map_err(StepError::Fatal)?;
        let mark_dir = self
            .config
            .keep_intermediates
            .then(|| work.path().join("marked"));

        let intent = self.transformer.intent();
        let mode = if intent == TransformIntent::Identity && self.config.compare_grayscale {
            ColorMode::Gray
        } else {
            ColorMode::Rgb
        };
        let rasterize = step_error(FailureKind::Rasterize);
        self.rasterizer
            .rasterize(&item.path, &original_dir, mode)
            .map_err(&rasterize)?;
        self.rasterizer
            .rasterize(&output, &transformed_dir, mode)
            .map_err(&rasterize)?;
        verdict.stage_reached = ItemStage::Rasterized;

        // Rasterized -> Validated
        let naming = self.rasterizer.naming();
        let rendered = naming.list_pages(&transformed_dir).map_err(&rasterize)?;
        verdict.num_pages = if stats.page_count > 0 {
            stats.page_count
        } else {
            u32::try_from(rendered.len()).unwrap_or(u32::MAX)
        };
        verdict.color_in = self
            .classifier
            .is_color_directory(&original_dir, &naming)
            .map_err(&rasterize)?;

        let judgment = match &intent {
            TransformIntent::Identity => {
                verdict.color_out = self
                    .classifier
                    .is_color_directory(&transformed_dir, &naming)
                    .map_err(&rasterize)?;
                let tolerance = self.config.tolerance_for(&verdict.name);
                let comparator = PerceptualComparator::new(tolerance);
                let comparison = comparator
                    .directories_equal(&original_dir, &transformed_dir, &naming)
                    .map_err(&rasterize)?;
                if comparison.is_equal() {
                    Ok(())
                } else {
                    Err(Failure::new(FailureKind::Comparison, describe(&comparison)))
                }
            }
            TransformIntent::Grayscale | TransformIntent::ColorPages(_) => {
                let pages = self
                    .classifier
                    .color_directory_pages(&transformed_dir, &naming, mark_dir.as_deref())
                    .map_err(&rasterize)?;
                verdict.color_out = !pages.is_empty();
                verdict.color_pages = pages;
                judge_color(&intent, &verdict.color_pages)
            }
        };
        verdict.stage_reached = ItemStage::Validated;
        judgment?;

        tracing::info!(
            input = %item.path.display(),
            pages = verdict.num_pages,
            ratio = verdict.size_ratio().unwrap_or(0.0),
            "passed"
        );
        Ok(())
    }

    /// The transformed document must parse, and must not parse with more
    /// renderer warnings than the original.
    fn check_structure(&self, input: &Path, output: &Path) -> Result<(), StepError> {
        let structural = step_error(FailureKind::Structural);
        let report = self
            .rasterizer
            .structural_check(output)
            .map_err(&structural)?;
        if report.warnings == 0 {
            return Ok(());
        }

        match self.rasterizer.structural_check(input) {
            Ok(original) if report.warnings > original.warnings => Err(Failure::new(
                FailureKind::Structural,
                format!(
                    "transformed document has {} renderer warnings, original has {}",
                    report.warnings, original.warnings
                ),
            )
            .into()),
            Ok(_) => Ok(()),
            Err(RasterproofError::Structural { message }) => {
                tracing::debug!(
                    input = %input.display(),
                    "original fails structural check: {message}"
                );
                Ok(())
            }
            Err(e) => Err(structural(e)),
        }
    }
}

fn judge_color(intent: &TransformIntent, pages: &BTreeSet<u32>) -> Result<(), Failure> {
    match intent {
        TransformIntent::Grayscale if !pages.is_empty() => Err(Failure::new(
            FailureKind::ColorPresent,
            format!("colored pages {} in grayscale output", page_list(pages)),
        )),
        TransformIntent::ColorPages(expected) if expected != pages => Err(Failure::new(
            FailureKind::ColorMismatch,
            format!(
                "colored pages {} but expected {}",
                page_list(pages),
                page_list(expected)
            ),
        )),
        _ => Ok(()),
    }
}
