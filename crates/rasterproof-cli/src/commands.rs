//! CLI command definitions using clap

use crate::output::OutputFormat;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rasterproof::{PageNaming, ToleranceProfile, TransformIntent};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Rasterproof: regression harness for document transforms
#[derive(Parser, Debug)]
#[command(name = "rasterproof")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit log events as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform a corpus and validate every output
    Run(RunArgs),

    /// Compare two page images or two page directories
    Compare(CompareArgs),

    /// Detect color in a page image or page directory
    Color(ColorArgs),

    /// Print the regression ledger
    Ledger(LedgerArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Corpus glob patterns (e.g. "corpus/**/*.pdf")
    #[arg(required_unless_present_any = ["replay", "ledger_corpus"])]
    pub patterns: Vec<String>,

    /// Transform program
    #[arg(short, long)]
    pub transform: PathBuf,

    /// Argument for the transform program ({input} and {output} are substituted)
    #[arg(long = "transform-arg", allow_hyphen_values = true)]
    pub transform_args: Vec<String>,

    /// What the transform promises about its output
    #[arg(long, default_value = "identity")]
    pub intent: IntentArg,

    /// Pages expected to carry color (with --intent color-pages)
    #[arg(long, value_delimiter = ',')]
    pub color_pages: Vec<u32>,

    /// Use a bad list from an earlier run as the corpus
    #[arg(long, conflicts_with = "ledger_corpus")]
    pub replay: Option<PathBuf>,

    /// Use the ledger's test names, resolved under this directory, as the corpus
    #[arg(long, value_name = "ROOT")]
    pub ledger_corpus: Option<PathBuf>,

    /// With --ledger-corpus, only replay documents recorded as colored
    #[arg(long, requires = "ledger_corpus")]
    pub only_color: bool,

    /// Output directory for transformed documents
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep per-item page rasters
    #[arg(short, long)]
    pub keep: bool,

    /// Rasterize in grayscale for identity comparison
    #[arg(short, long)]
    pub grayscale: bool,

    /// Keep going after a failed item
    #[arg(short = 'a', long)]
    pub run_all: bool,

    /// Skip documents smaller than this many bytes
    #[arg(long)]
    pub min: Option<u64>,

    /// Skip documents of this many bytes or more
    #[arg(long)]
    pub max: Option<u64>,

    /// Harness configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Ledger file
    #[arg(long, conflicts_with = "no_ledger")]
    pub ledger: Option<PathBuf>,

    /// Do not record results
    #[arg(long)]
    pub no_ledger: bool,

    /// Write failing paths to this file
    #[arg(long)]
    pub bad_list: Option<PathBuf>,

    /// Timeout for each external tool call in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Tolerance overrides
    #[command(flatten)]
    pub tolerance: ToleranceArgs,

    /// Ghostscript binary
    #[arg(long)]
    pub gs: Option<PathBuf>,

    /// Rasterization resolution
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Document password passed to the rasterizer
    #[arg(long)]
    pub password: Option<String>,

    /// Output format for the run summary
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

impl RunArgs {
    /// Intent for the transform command
    #[must_use]
    pub fn transform_intent(&self) -> TransformIntent {
        match self.intent {
            IntentArg::Identity => TransformIntent::Identity,
            IntentArg::Grayscale => TransformIntent::Grayscale,
            IntentArg::ColorPages => TransformIntent::ColorPages(
                self.color_pages.iter().copied().collect::<BTreeSet<_>>(),
            ),
        }
    }
}

/// Tolerance flags shared by run and compare
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ToleranceArgs {
    /// Maximum fraction of differing pixels
    #[arg(long)]
    pub frac_pixels: Option<f64>,

    /// Maximum mean distance among differing pixels (0-255)
    #[arg(long)]
    pub mean_distance: Option<f64>,
}

impl ToleranceArgs {
    /// Apply the flags given on the command line over `base`
    #[must_use]
    pub fn apply(&self, base: ToleranceProfile) -> ToleranceProfile {
        let mut profile = base;
        if let Some(frac) = self.frac_pixels {
            profile = profile.with_frac_pixels(frac);
        }
        if let Some(mean) = self.mean_distance {
            profile = profile.with_mean_distance(mean);
        }
        profile
    }

    /// Whether any flag was given
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.frac_pixels.is_some() || self.mean_distance.is_some()
    }
}

/// Page file naming flags
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    /// Page file prefix
    #[arg(long, default_value = "doc")]
    pub prefix: String,

    /// Page file extension
    #[arg(long, default_value = "png")]
    pub ext: String,
}

impl PageArgs {
    /// Naming convention described by the flags
    #[must_use]
    pub fn naming(&self) -> PageNaming {
        PageNaming::new(&self.prefix, &self.ext)
    }
}

/// Arguments for the compare command
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// First image or page directory
    pub left: PathBuf,

    /// Second image or page directory
    pub right: PathBuf,

    /// Tolerance
    #[command(flatten)]
    pub tolerance: ToleranceArgs,

    /// Page naming (directories only)
    #[command(flatten)]
    pub pages: PageArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the color command
#[derive(Parser, Debug)]
pub struct ColorArgs {
    /// Image or page directory
    pub path: PathBuf,

    /// Write marked diagnostic images into this directory
    #[arg(long)]
    pub mark: Option<PathBuf>,

    /// Color score threshold (0-255 scale)
    #[arg(long, default_value_t = rasterproof::DEFAULT_COLOR_THRESHOLD)]
    pub threshold: f64,

    /// Page naming (directories only)
    #[command(flatten)]
    pub pages: PageArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the ledger command
#[derive(Parser, Debug)]
pub struct LedgerArgs {
    /// Ledger file
    #[arg(long, default_value = rasterproof::DEFAULT_LEDGER_FILE)]
    pub ledger: PathBuf,

    /// Only records whose transformed document has (true) or lacks (false) color
    #[arg(long)]
    pub color_out: Option<bool>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Transform intent argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntentArg {
    /// Output must render like the input
    #[default]
    Identity,
    /// Output must render without color
    Grayscale,
    /// Only the pages given by --color-pages may carry color
    ColorPages,
}

/// Output format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_verify_cli() {
            use clap::CommandFactory;
            Cli::command().debug_assert();
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from([
                "rasterproof",
                "-vv",
                "--color",
                "never",
                "--log-json",
                "ledger",
            ]);
            assert_eq!(cli.verbose, 2);
            assert!(cli.log_json);
            assert!(matches!(cli.color, ColorArg::Never));
            assert!(!cli.quiet);
        }
    }

    mod run_args_tests {
        use super::*;

        fn parse_run(args: &[&str]) -> RunArgs {
            let mut full = vec!["rasterproof", "run"];
            full.extend_from_slice(args);
            match Cli::parse_from(full).command {
                Commands::Run(args) => args,
                other => panic!("expected Run command, got {other:?}"),
            }
        }

        #[test]
        fn test_parse_run_defaults() {
            let args = parse_run(&["-t", "xform", "corpus/*.pdf"]);
            assert_eq!(args.patterns, vec!["corpus/*.pdf"]);
            assert_eq!(args.intent, IntentArg::Identity);
            assert!(!args.run_all);
            assert!(!args.keep);
            assert!(args.output.is_none());
            assert!(!args.tolerance.is_set());
            assert_eq!(args.transform_intent(), TransformIntent::Identity);
        }

        #[test]
        fn test_parse_run_flags() {
            let args = parse_run(&[
                "-t", "xform", "-a", "-k", "-g", "-o", "out2", "--min", "10", "--max", "5000",
                "--timeout", "30", "--no-ledger", "a.pdf", "b.pdf",
            ]);
            assert!(args.run_all && args.keep && args.grayscale && args.no_ledger);
            assert_eq!(args.output, Some(PathBuf::from("out2")));
            assert_eq!((args.min, args.max), (Some(10), Some(5000)));
            assert_eq!(args.timeout, Some(30));
            assert_eq!(args.patterns.len(), 2);
        }

        #[test]
        fn test_transform_args_allow_hyphens() {
            let args = parse_run(&[
                "-t",
                "qpdf",
                "--transform-arg",
                "--linearize",
                "--transform-arg",
                "{input}",
                "x.pdf",
            ]);
            assert_eq!(args.transform_args, vec!["--linearize", "{input}"]);
        }

        #[test]
        fn test_color_pages_intent() {
            let args = parse_run(&[
                "-t",
                "x",
                "--intent",
                "color-pages",
                "--color-pages",
                "3,1",
                "a.pdf",
            ]);
            let expected: BTreeSet<u32> = [1, 3].into_iter().collect();
            assert_eq!(args.transform_intent(), TransformIntent::ColorPages(expected));
        }

        #[test]
        fn test_replay_without_patterns() {
            let args = parse_run(&["-t", "x", "--replay", "bad.txt"]);
            assert!(args.patterns.is_empty());
            assert_eq!(args.replay, Some(PathBuf::from("bad.txt")));
        }

        #[test]
        fn test_patterns_required() {
            assert!(Cli::try_parse_from(["rasterproof", "run", "-t", "x"]).is_err());
        }

        #[test]
        fn test_ledger_conflicts_with_no_ledger() {
            let result = Cli::try_parse_from([
                "rasterproof", "run", "-t", "x", "--ledger", "l.csv", "--no-ledger", "a.pdf",
            ]);
            assert!(result.is_err());
        }

        #[test]
        fn test_only_color_requires_ledger_corpus() {
            let result =
                Cli::try_parse_from(["rasterproof", "run", "-t", "x", "--only-color", "a.pdf"]);
            assert!(result.is_err());
        }
    }

    mod tolerance_args_tests {
        use super::*;

        #[test]
        fn test_apply_partial() {
            let args = ToleranceArgs {
                frac_pixels: Some(0.5),
                mean_distance: None,
            };
            let profile = args.apply(ToleranceProfile::IDENTITY);
            assert!((profile.frac_pixels - 0.5).abs() < f64::EPSILON);
            let base = ToleranceProfile::IDENTITY.mean_distance;
            assert!((profile.mean_distance - base).abs() < f64::EPSILON);
        }

        #[test]
        fn test_apply_none_keeps_base() {
            let profile = ToleranceArgs::default().apply(ToleranceProfile::EXACT);
            assert_eq!(profile, ToleranceProfile::EXACT);
        }
    }

    mod other_command_tests {
        use super::*;

        #[test]
        fn test_parse_compare() {
            let cli = Cli::parse_from([
                "rasterproof",
                "compare",
                "a",
                "b",
                "--frac-pixels",
                "0.1",
                "--prefix",
                "page",
            ]);
            if let Commands::Compare(args) = cli.command {
                assert_eq!(args.left, PathBuf::from("a"));
                assert_eq!(args.tolerance.frac_pixels, Some(0.1));
                assert_eq!(args.pages.naming().file_name(2), "page-002.png");
            } else {
                panic!("expected Compare command");
            }
        }

        #[test]
        fn test_parse_color() {
            let cli = Cli::parse_from([
                "rasterproof",
                "color",
                "pages",
                "--mark",
                "marks",
                "--format",
                "json",
            ]);
            if let Commands::Color(args) = cli.command {
                assert_eq!(args.mark, Some(PathBuf::from("marks")));
                assert_eq!(args.format, FormatArg::Json);
                let default = rasterproof::DEFAULT_COLOR_THRESHOLD;
                assert!((args.threshold - default).abs() < f64::EPSILON);
            } else {
                panic!("expected Color command");
            }
        }

        #[test]
        fn test_parse_ledger() {
            let cli = Cli::parse_from(["rasterproof", "ledger", "--color-out", "true"]);
            if let Commands::Ledger(args) = cli.command {
                assert_eq!(args.ledger, PathBuf::from(rasterproof::DEFAULT_LEDGER_FILE));
                assert_eq!(args.color_out, Some(true));
            } else {
                panic!("expected Ledger command");
            }
        }

        #[test]
        fn test_format_conversion() {
            assert_eq!(OutputFormat::from(FormatArg::Json), OutputFormat::Json);
            assert_eq!(OutputFormat::from(FormatArg::Text), OutputFormat::Text);
        }
    }
}
