//! Ledger command handler

use crate::commands::LedgerArgs;
use crate::error::CliResult;
use rasterproof::{Ledger, TestRecord};

/// Load the ledger and select the records asked for
///
/// # Errors
///
/// Returns an error if the ledger file exists but cannot be read
pub fn execute_ledger(args: &LedgerArgs) -> CliResult<Vec<TestRecord>> {
    let ledger = Ledger::load(&args.ledger)?;
    let color_out = args.color_out;
    Ok(ledger
        .select(move |r| color_out.map_or(true, |want| r.color_out == want))
        .cloned()
        .collect())
}

/// Render records as a JSON array
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn render_ledger_json(records: &[TestRecord]) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(records)?)
}
