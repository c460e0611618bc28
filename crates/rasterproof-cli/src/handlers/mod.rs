//! Command handlers - extracted from main.rs for testability
//!
//! Each handler computes a serializable report and renders it as text;
//! `main` decides the exit code from the report.

pub mod color;
pub mod compare;
pub mod ledger;

pub use color::{execute_color, render_color_text, ColorReport};
pub use compare::{execute_compare, render_compare_text, CompareReport};
pub use ledger::{execute_ledger, render_ledger_json};
