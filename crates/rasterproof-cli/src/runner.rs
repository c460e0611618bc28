//! Corpus run: flags + config file to a finished `RunSummary`

use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use rasterproof::{
    corpus, CommandTransformer, CorpusItem, GhostscriptRasterizer, HarnessConfig, Ledger,
    Orchestrator, RunSummary, SizeRange, DEFAULT_LEDGER_FILE,
};
use std::path::PathBuf;

/// Drives one `rasterproof run` invocation
#[derive(Debug)]
pub struct CorpusRunner {
    config: CliConfig,
}

impl CorpusRunner {
    /// Create a runner with the given presentation config
    #[must_use]
    pub const fn new(config: CliConfig) -> Self {
        Self { config }
    }

    /// Harness configuration: file values (or defaults) with flags applied on top
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or the result is invalid
    pub fn harness_config(args: &RunArgs) -> CliResult<HarnessConfig> {
        let mut config = match &args.config {
            Some(path) => HarnessConfig::from_yaml_file(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(dir) = &args.output {
            config = config.with_output_dir(dir);
        }
        config.keep_intermediates |= args.keep;
        config.compare_grayscale |= args.grayscale;
        config.run_all |= args.run_all;
        if args.min.is_some() || args.max.is_some() {
            let range = SizeRange::new(
                args.min.or(config.size_range.min),
                args.max.or(config.size_range.max),
            );
            config = config.with_size_range(range);
        }
        if args.tolerance.is_set() {
            let tolerance = args.tolerance.apply(config.tolerance);
            config = config.with_tolerance(tolerance);
        }
        if let Some(secs) = args.timeout {
            config = config.with_tool_timeout_secs(secs);
        }
        if args.no_ledger {
            config = config.with_ledger_path(None);
        } else if let Some(path) = &args.ledger {
            config = config.with_ledger_path(Some(path.clone()));
        }
        if let Some(path) = &args.bad_list {
            config = config.with_bad_list_path(Some(path.clone()));
        }

        config.validate()?;
        Ok(config)
    }

    /// Corpus for this run, sorted by size and filtered by the size range
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable sources or an empty corpus
    pub fn corpus(args: &RunArgs, config: &HarnessConfig) -> CliResult<Vec<CorpusItem>> {
        let items = if let Some(bad_list) = &args.replay {
            corpus::from_bad_list(bad_list)?
        } else if let Some(root) = &args.ledger_corpus {
            let source = config
                .ledger_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE));
            let ledger = Ledger::load(source)?;
            let only_color = args.only_color;
            corpus::from_ledger(&ledger, root, |record| !only_color || record.color_in)
        } else {
            corpus::discover(&args.patterns)?
        };

        let items = corpus::sort_and_filter(items, config.size_range);
        if items.is_empty() {
            return Err(CliError::invalid_argument("no corpus documents matched"));
        }
        Ok(items)
    }

    /// Rasterizer configured from flags and timeout
    #[must_use]
    pub fn rasterizer(args: &RunArgs, config: &HarnessConfig) -> GhostscriptRasterizer {
        let mut rasterizer = GhostscriptRasterizer::new().with_timeout(config.tool_timeout());
        if let Some(gs) = &args.gs {
            rasterizer = rasterizer.with_binary(gs);
        }
        if let Some(dpi) = args.dpi {
            rasterizer = rasterizer.with_dpi(dpi);
        }
        if let Some(password) = &args.password {
            rasterizer = rasterizer.with_password(password);
        }
        rasterizer
    }

    /// Execute the run
    ///
    /// # Errors
    ///
    /// Returns fatal harness errors; failed items are reported in the summary
    pub fn run(&self, args: &RunArgs) -> CliResult<RunSummary> {
        let config = Self::harness_config(args)?;
        let items = Self::corpus(args, &config)?;
        std::fs::create_dir_all(&config.output_dir)?;

        let transformer = CommandTransformer::new(&args.transform, args.transform_intent())
            .with_args(args.transform_args.iter().cloned())
            .with_timeout(config.tool_timeout());
        let rasterizer = Self::rasterizer(args, &config);

        let mut ledger = match &config.ledger_path {
            Some(path) => Some(Ledger::load(path)?),
            None => None,
        };

        tracing::debug!(?config, items = items.len(), "corpus run configured");
        let mut reporter = ProgressReporter::new(
            self.config.color.should_color(),
            self.config.verbosity.is_quiet(),
        )
        .with_verbose(self.config.verbosity.is_verbose());

        let orchestrator = Orchestrator::new(transformer, rasterizer, config);
        let result = orchestrator.run(&items, ledger.as_mut(), &mut reporter);
        reporter.finish();
        Ok(result?)
    }
}
