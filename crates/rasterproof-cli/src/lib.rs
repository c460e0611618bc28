//! Rasterproof CLI library
//!
//! Command-line interface for the Rasterproof regression harness: corpus
//! runs, raster comparison, color inspection and ledger listing.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, ColorArgs, Commands, CompareArgs, FormatArg, IntentArg, LedgerArgs, PageArgs,
    RunArgs, ToleranceArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_ledger_table, OutputFormat, ProgressReporter};
pub use runner::CorpusRunner;
