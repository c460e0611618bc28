//! Rasterproof: regression harness for document transforms
//!
//! A transform is run over a corpus of documents. Both the original and the
//! transformed document are rendered page by page by an external rasterizer,
//! and the page images are judged perceptually: identity transforms must
//! render the same within a tolerance, grayscale transforms must render
//! without color. Passing items are recorded in a CSV regression ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    RASTERPROOF Architecture                     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Corpus     │    │ Transformer│    │ Rasterizer │            │
//! │   │ (glob,     │───►│ (external  │───►│ (gs, one   │            │
//! │   │  ledger)   │    │  command)  │    │  PNG/page) │            │
//! │   └────────────┘    └────────────┘    └─────┬──────┘            │
//! │                                             │                   │
//! │   ┌────────────┐    ┌────────────┐    ┌─────▼──────┐            │
//! │   │ Ledger     │◄───│ Orchestr-  │◄───│ Comparator │            │
//! │   │ (CSV)      │    │ ator       │    │ Classifier │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rasterproof::{
//!     corpus, CommandTransformer, GhostscriptRasterizer, HarnessConfig, Ledger,
//!     NoopObserver, Orchestrator, TransformIntent,
//! };
//!
//! # fn main() -> rasterproof::RasterproofResult<()> {
//! let config = HarnessConfig::new().with_output_dir("out").with_run_all(true);
//! let items = corpus::sort_and_filter(corpus::discover(&["corpus/*.pdf"])?, config.size_range);
//! let transformer = CommandTransformer::new("my-transform", TransformIntent::Grayscale);
//! let mut ledger = Ledger::load("xform.test.results.csv")?;
//!
//! let orchestrator = Orchestrator::new(transformer, GhostscriptRasterizer::new(), config);
//! let summary = orchestrator.run(&items, Some(&mut ledger), &mut NoopObserver)?;
//! println!("{} passed, {} failed", summary.passed(), summary.failed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod collab;
pub mod color;
pub mod compare;
pub mod config;
pub mod corpus;
pub mod ledger;
pub mod orchestrator;
pub mod pages;
pub mod process;
pub mod raster;
mod result;
pub mod tolerance;
pub mod workdir;

pub use collab::{
    ColorMode, CommandTransformer, GhostscriptRasterizer, Rasterizer, StructuralReport,
    TransformIntent, TransformOutput, Transformer,
};
pub use color::{ColorClassifier, ColorSummary, DEFAULT_COLOR_THRESHOLD};
pub use compare::{DiffStats, DirectoryComparison, PerceptualComparator, RasterDiff};
pub use config::{HarnessConfig, SizeRange};
pub use corpus::CorpusItem;
pub use ledger::{Ledger, TestRecord, DEFAULT_LEDGER_FILE};
pub use orchestrator::{
    Failure, FailureKind, ItemStage, ItemVerdict, NoopObserver, Orchestrator, RunObserver,
    RunSummary,
};
pub use pages::PageNaming;
pub use raster::{load_raster, Raster};
pub use result::{RasterproofError, RasterproofResult};
pub use tolerance::ToleranceProfile;
pub use workdir::WorkDir;
