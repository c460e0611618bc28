//! Rasterproof CLI: regression harness for document transforms
//!
//! ## Usage
//!
//! ```bash
//! rasterproof run -t my-xform --transform-arg {input} --transform-arg {output} 'corpus/*.pdf'
//! rasterproof run -t my-xform --intent grayscale -a --bad-list bad.txt 'corpus/*.pdf'
//! rasterproof run -t my-xform --replay bad.txt
//! rasterproof compare pages-a/ pages-b/ --frac-pixels 0.001
//! rasterproof color page-001.png --mark marks/
//! rasterproof ledger --format json
//! ```

use clap::Parser;
use rasterproof_cli::handlers::{
    execute_color, execute_compare, execute_ledger, render_color_text, render_compare_text,
    render_ledger_json,
};
use rasterproof_cli::{
    render_ledger_table, Cli, CliConfig, CliResult, ColorArgs, ColorChoice, Commands, CompareArgs,
    CorpusRunner, LedgerArgs, OutputFormat, ProgressReporter, RunArgs, Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(&config);

    match cli.command {
        Commands::Run(args) => run_corpus(config, &args),
        Commands::Compare(args) => run_compare(&args),
        Commands::Color(args) => run_color(&args),
        Commands::Ledger(args) => run_ledger(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_json(cli.log_json)
}

fn init_logging(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A second init (tests, embedding) keeps the first subscriber
    let _ = if config.log_json {
        builder.json().try_init()
    } else {
        builder.with_ansi(config.color.should_color()).try_init()
    };
}

const fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_corpus(config: CliConfig, args: &RunArgs) -> CliResult<ExitCode> {
    let format = OutputFormat::from(args.format);
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let summary = CorpusRunner::new(config).run(args)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            reporter.summary(&summary);
            for path in summary.bad_list() {
                println!("{}", path.display());
            }
        }
    }
    Ok(exit_code(summary.is_success()))
}

fn run_compare(args: &CompareArgs) -> CliResult<ExitCode> {
    let report = execute_compare(args)?;
    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_compare_text(&report)),
    }
    Ok(exit_code(report.equal))
}

fn run_color(args: &ColorArgs) -> CliResult<ExitCode> {
    let report = execute_color(args)?;
    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_color_text(&report)),
    }
    Ok(exit_code(!report.colored))
}

fn run_ledger(args: &LedgerArgs) -> CliResult<ExitCode> {
    let records = execute_ledger(args)?;
    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", render_ledger_json(&records)?),
        OutputFormat::Text => print!("{}", render_ledger_table(&records)),
    }
    Ok(ExitCode::SUCCESS)
}
