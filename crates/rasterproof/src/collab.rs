//! External collaborators: the document transform and the rasterizer.
//!
//! The orchestrator only talks to the [`Transformer`] and [`Rasterizer`]
//! traits. Process-backed implementations are provided for real runs:
//!
//! ```text
//! ┌──────────────┐ transform ┌──────────────────────┐
//! │ Orchestrator │──────────►│ CommandTransformer   │──► <program> {input} {output}
//! │              │ rasterize ├──────────────────────┤
//! │              │──────────►│ GhostscriptRasterizer│──► gs -sDEVICE=png16m ...
//! └──────────────┘           └──────────────────────┘
//! ```
//!
//! Tests substitute fakes that write canned page images.

use crate::pages::PageNaming;
use crate::process::run_tool;
use crate::result::{RasterproofError, RasterproofResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// What a transform promises about the rendering of its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformIntent {
    /// Output must render like the input
    Identity,
    /// Output must render without any colored pixel
    Grayscale,
    /// Output must carry color on exactly these pages (1-indexed)
    ColorPages(BTreeSet<u32>),
}

impl std::fmt::Display for TransformIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Grayscale => write!(f, "grayscale"),
            Self::ColorPages(pages) => {
                let list: Vec<String> = pages.iter().map(ToString::to_string).collect();
                write!(f, "color-pages[{}]", list.join(","))
            }
        }
    }
}

/// Statistics reported by a successful transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Pages in the output document
    pub page_count: u32,
    /// Image objects processed
    pub image_objects: u32,
    /// Form objects processed
    pub form_objects: u32,
}

/// Rasterizer output color model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Full color
    #[default]
    Rgb,
    /// Single gray channel
    Gray,
}

/// Result of a structural check that did not reject the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StructuralReport {
    /// Renderer warnings emitted while parsing
    pub warnings: usize,
}

/// A document transform under test
pub trait Transformer {
    /// Declared effect of the transform on the rendering
    fn intent(&self) -> TransformIntent;

    /// Transform `input` into `output`
    ///
    /// # Errors
    ///
    /// `Transform` when no output is produced, `Timeout` on expiry
    fn transform(&self, input: &Path, output: &Path) -> RasterproofResult<TransformOutput>;
}

/// A renderer turning documents into one raster file per page
pub trait Rasterizer {
    /// Naming of the page files written by [`Rasterizer::rasterize`]
    fn naming(&self) -> PageNaming;

    /// Render every page of `doc` into `out_dir`
    ///
    /// # Errors
    ///
    /// `Rasterize` when rendering fails, `Timeout` on expiry
    fn rasterize(&self, doc: &Path, out_dir: &Path, mode: ColorMode) -> RasterproofResult<()>;

    /// Parse `doc` without producing output
    ///
    /// # Errors
    ///
    /// `Structural` when the renderer rejects the document, `Timeout` on expiry
    fn structural_check(&self, doc: &Path) -> RasterproofResult<StructuralReport>;
}

/// Default Ghostscript binary for this platform
#[must_use]
pub const fn ghostscript_binary() -> &'static str {
    if cfg!(windows) {
        "gswin64c.exe"
    } else {
        "gs"
    }
}

/// Default rendering resolution
pub const DEFAULT_DPI: u32 = 150;

/// Marker Ghostscript prints before each recoverable parse problem
const GS_WARNING_MARKER: &str = "****";

/// [`Rasterizer`] backed by Ghostscript
#[derive(Debug, Clone)]
pub struct GhostscriptRasterizer {
    binary: PathBuf,
    dpi: u32,
    password: Option<String>,
    naming: PageNaming,
    timeout: Option<Duration>,
}

impl Default for GhostscriptRasterizer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(ghostscript_binary()),
            dpi: DEFAULT_DPI,
            password: None,
            naming: PageNaming::default(),
            timeout: None,
        }
    }
}

impl GhostscriptRasterizer {
    /// Create with platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Ghostscript binary
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the resolution
    #[must_use]
    pub const fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Set the document password used by structural checks
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the per-invocation timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for rendering `doc` into `out_dir`
    #[must_use]
    pub fn rasterize_args(&self, doc: &Path, out_dir: &Path, mode: ColorMode) -> Vec<OsString> {
        let device = match mode {
            ColorMode::Rgb => "png16m",
            ColorMode::Gray => "pnggray",
        };
        let mut output = OsString::from("-sOutputFile=");
        output.push(out_dir.join(self.naming.output_template()));

        let mut args: Vec<OsString> = ["-dSAFER", "-dBATCH", "-dNOPAUSE"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(format!("-r{}", self.dpi).into());
        args.push(format!("-sDEVICE={device}").into());
        args.push("-dTextAlphaBits=1".into());
        args.push("-dGraphicsAlphaBits=1".into());
        args.push(output);
        args.push(doc.as_os_str().to_owned());
        args
    }

    /// Arguments for parsing `doc` without output
    #[must_use]
    pub fn structural_args(&self, doc: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-dBATCH", "-dNODISPLAY", "-dNOPAUSE"]
            .into_iter()
            .map(OsString::from)
            .collect();
        if let Some(password) = &self.password {
            args.push(format!("-sPDFPassword={password}").into());
        }
        args.push(doc.as_os_str().to_owned());
        args
    }
}

/// Number of warning markers in renderer diagnostics
#[must_use]
pub fn count_warnings(stderr: &str) -> usize {
    stderr.matches(GS_WARNING_MARKER).count()
}

fn excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(200) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

impl Rasterizer for GhostscriptRasterizer {
    fn naming(&self) -> PageNaming {
        self.naming.clone()
    }

    fn rasterize(&self, doc: &Path, out_dir: &Path, mode: ColorMode) -> RasterproofResult<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.rasterize_args(doc, out_dir, mode));
        let output = run_tool(cmd, "ghostscript", self.timeout)?;
        if !output.success() {
            tracing::error!(
                doc = %doc.display(),
                stdout = %output.stdout,
                stderr = %output.stderr,
                "ghostscript could not render document"
            );
            return Err(RasterproofError::rasterize(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                excerpt(&output.stderr)
            )));
        }
        Ok(())
    }

    fn structural_check(&self, doc: &Path) -> RasterproofResult<StructuralReport> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.structural_args(doc));
        let output = run_tool(cmd, "ghostscript", self.timeout)?;
        if !output.success() {
            return Err(RasterproofError::structural(format!(
                "{} rejected {} ({}): {}",
                self.binary.display(),
                doc.display(),
                output.status,
                excerpt(&output.stderr)
            )));
        }
        let warnings = count_warnings(&output.stderr);
        if warnings > 0 {
            tracing::debug!(doc = %doc.display(), warnings, "ghostscript warnings");
        }
        Ok(StructuralReport { warnings })
    }
}

/// [`Transformer`] that runs an external program.
///
/// Arguments may contain `{input}` and `{output}` placeholders. When neither
/// appears, the input and output paths are appended. Lines of the form
/// `pages=N`, `image_objects=N` and `form_objects=N` on stdout fill in the
/// reported [`TransformOutput`].
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: PathBuf,
    args: Vec<String>,
    intent: TransformIntent,
    timeout: Option<Duration>,
}

impl CommandTransformer {
    /// Create a transformer running `program`
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, intent: TransformIntent) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            intent,
            timeout: None,
        }
    }

    /// Append one argument
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the per-invocation timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Concrete argument list for one invocation
    #[must_use]
    pub fn command_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let has_placeholder = self
            .args
            .iter()
            .any(|a| a.contains("{input}") || a.contains("{output}"));
        let input_str = input.to_string_lossy();
        let output_str = output.to_string_lossy();

        let mut args: Vec<OsString> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{input}", &input_str)
                    .replace("{output}", &output_str)
                    .into()
            })
            .collect();
        if !has_placeholder {
            args.push(input.as_os_str().to_owned());
            args.push(output.as_os_str().to_owned());
        }
        args
    }
}

/// Parse `key=value` statistics from transform stdout
#[must_use]
pub fn parse_transform_stats(stdout: &str) -> TransformOutput {
    let mut out = TransformOutput::default();
    for line in stdout.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u32>() else {
            continue;
        };
        match key.trim() {
            "pages" => out.page_count = value,
            "image_objects" => out.image_objects = value,
            "form_objects" => out.form_objects = value,
            _ => {}
        }
    }
    out
}

impl Transformer for CommandTransformer {
    fn intent(&self) -> TransformIntent {
        self.intent.clone()
    }

    fn transform(&self, input: &Path, output: &Path) -> RasterproofResult<TransformOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.command_args(input, output));
        let tool = self.program.to_string_lossy();
        let result = run_tool(cmd, &tool, self.timeout)?;

        if !result.success() {
            return Err(RasterproofError::transform(format!(
                "{tool} exited with {}: {}",
                result.status,
                excerpt(&result.stderr)
            )));
        }
        if !output.is_file() {
            return Err(RasterproofError::transform(format!(
                "{tool} produced no output at {}",
                output.display()
            )));
        }
        Ok(parse_transform_stats(&result.stdout))
    }
}
