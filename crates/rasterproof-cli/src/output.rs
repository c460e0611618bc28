//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use rasterproof::{CorpusItem, ItemVerdict, RunObserver, RunSummary, TestRecord};
use serde::{Deserialize, Serialize};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Operator-facing progress for corpus runs.
///
/// Writes to stderr so stdout stays clean for results.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print a line for every passed item
    pub verbose: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Also report passed items
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Start a progress bar over `total` items
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| {
                let _ = self.term.write_line(text);
            }),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Failures print even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print run summary
    pub fn summary(&self, summary: &RunSummary) {
        let (passed, failed) = (summary.passed(), summary.failed());
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");
        let total = passed + failed;
        let duration_secs = summary.duration_secs;
        let halted = if summary.halted { " (stopped at first failure)" } else { "" };

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} items in {:.2}s ({} passed, {} failed){}",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                halted
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} items in {duration_secs:.2}s \
                 ({passed} passed, {failed} failed){halted}"
            ));
        }

        for (kind, count) in summary.failure_counts() {
            let _ = self.term.write_line(&format!("  {kind}: {count}"));
        }
        if let Some(mean) = summary.mean_transform_seconds() {
            let _ = self.term.write_line(&format!(
                "  transform: {:.3}s total, {mean:.3}s mean, {} -> {} bytes",
                summary.transform_seconds(),
                summary.input_bytes(),
                summary.output_bytes()
            ));
        }
    }
}

impl RunObserver for ProgressReporter {
    fn run_started(&mut self, total: usize) {
        self.start_progress(total as u64, "validating");
    }

    fn item_started(&mut self, _index: usize, item: &CorpusItem) {
        self.set_message(&item.name());
    }

    fn item_finished(&mut self, _index: usize, verdict: &ItemVerdict) {
        self.increment(1);
        match &verdict.failure {
            Some(failure) => self.failure(&format!(
                "{} [{}] {failure}",
                verdict.path.display(),
                verdict.stage_reached
            )),
            None if self.verbose => self.success(&format!(
                "{} ({} pages, {:.3}s)",
                verdict.path.display(),
                verdict.num_pages,
                verdict.transform_secs
            )),
            None => {}
        }
    }
}

/// Render ledger records as an aligned text table
#[must_use]
pub fn render_ledger_table(records: &[TestRecord]) -> String {
    let width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = format!(
        "{:<width$}  {:>7}  {:>8}  {:>5}  {:>9}  {:>6}  {:>5}\n",
        "name", "colorIn", "colorOut", "pages", "duration", "images", "forms"
    );
    for r in records {
        out.push_str(&format!(
            "{:<width$}  {:>7}  {:>8}  {:>5}  {:>9.3}  {:>6}  {:>5}\n",
            r.name,
            r.color_in,
            r.color_out,
            r.num_pages,
            r.duration_secs,
            r.image_objects,
            r.form_objects
        ));
    }
    out
}
