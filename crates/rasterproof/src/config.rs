//! Harness configuration.
//!
//! Loadable from YAML; every field has a default so a partial file is valid.

use crate::ledger::DEFAULT_LEDGER_FILE;
use crate::result::{RasterproofError, RasterproofResult};
use crate::tolerance::ToleranceProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-invocation timeout for external tools
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Byte-size window for corpus items: `min <= size < max`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeRange {
    /// Smallest accepted size (inclusive)
    pub min: Option<u64>,
    /// Size limit (exclusive)
    pub max: Option<u64>,
}

impl SizeRange {
    /// Create a range
    #[must_use]
    pub const fn new(min: Option<u64>, max: Option<u64>) -> Self {
        Self { min, max }
    }

    /// Whether `size` falls inside the range
    #[must_use]
    pub fn contains(&self, size: u64) -> bool {
        self.min.map_or(true, |min| size >= min) && self.max.map_or(true, |max| size < max)
    }
}

/// Configuration for one corpus run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory receiving transformed documents
    pub output_dir: PathBuf,
    /// Keep per-item raster directories after the run
    pub keep_intermediates: bool,
    /// Rasterize in grayscale for identity comparison
    pub compare_grayscale: bool,
    /// Continue after a failed item instead of halting
    pub run_all: bool,
    /// Corpus size filter
    pub size_range: SizeRange,
    /// Default tolerance profile
    pub tolerance: ToleranceProfile,
    /// Per-item tolerance profiles keyed by corpus file name
    pub overrides: BTreeMap<String, ToleranceProfile>,
    /// Timeout for each external tool invocation, 0 disables it
    pub tool_timeout_secs: u64,
    /// Regression ledger file, `None` disables the ledger
    pub ledger_path: Option<PathBuf>,
    /// Where to write the bad list at the end of a run
    pub bad_list_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            keep_intermediates: false,
            compare_grayscale: false,
            run_all: false,
            size_range: SizeRange::default(),
            tolerance: ToleranceProfile::default(),
            overrides: BTreeMap::new(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            ledger_path: Some(PathBuf::from(DEFAULT_LEDGER_FILE)),
            bad_list_path: None,
        }
    }
}

impl HarnessConfig {
    /// Create a default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// Returns `Yaml` if the document is malformed
    pub fn from_yaml(yaml: &str) -> RasterproofResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load and validate a YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read, `Yaml` if it is malformed,
    /// or the validation error
    pub fn from_yaml_file(path: &Path) -> RasterproofResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RasterproofError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns `Yaml` if serialization fails
    pub fn to_yaml(&self) -> RasterproofResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set keep-intermediates
    #[must_use]
    pub const fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    /// Set grayscale rasterization for identity comparison
    #[must_use]
    pub const fn with_compare_grayscale(mut self, gray: bool) -> Self {
        self.compare_grayscale = gray;
        self
    }

    /// Set run-all (`false` = fail-fast)
    #[must_use]
    pub const fn with_run_all(mut self, run_all: bool) -> Self {
        self.run_all = run_all;
        self
    }

    /// Set the size filter
    #[must_use]
    pub const fn with_size_range(mut self, range: SizeRange) -> Self {
        self.size_range = range;
        self
    }

    /// Set the default tolerance
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: ToleranceProfile) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Add a per-item tolerance override
    #[must_use]
    pub fn with_override(mut self, name: impl Into<String>, tolerance: ToleranceProfile) -> Self {
        self.overrides.insert(name.into(), tolerance);
        self
    }

    /// Set the external tool timeout in seconds
    #[must_use]
    pub const fn with_tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    /// Set or disable the ledger file
    #[must_use]
    pub fn with_ledger_path(mut self, path: Option<PathBuf>) -> Self {
        self.ledger_path = path;
        self
    }

    /// Set the bad-list file
    #[must_use]
    pub fn with_bad_list_path(mut self, path: Option<PathBuf>) -> Self {
        self.bad_list_path = path;
        self
    }

    /// External tool timeout, `None` when disabled
    #[must_use]
    pub const fn tool_timeout(&self) -> Option<Duration> {
        if self.tool_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.tool_timeout_secs))
        }
    }

    /// Tolerance for the corpus item named `name`
    #[must_use]
    pub fn tolerance_for(&self, name: &str) -> ToleranceProfile {
        self.overrides.get(name).copied().unwrap_or(self.tolerance)
    }

    /// Check value domains
    ///
    /// # Errors
    ///
    /// Returns `InvalidTolerance` for a bad profile, `Config` for an empty
    /// size range
    pub fn validate(&self) -> RasterproofResult<()> {
        self.tolerance.validate()?;
        for (name, profile) in &self.overrides {
            profile.validate().map_err(|e| RasterproofError::InvalidTolerance {
                message: format!("override {name}: {e}"),
            })?;
        }
        if let (Some(min), Some(max)) = (self.size_range.min, self.size_range.max) {
            if min > max {
                return Err(RasterproofError::config(format!(
                    "size range min {min} exceeds max {max}"
                )));
            }
        }
        Ok(())
    }
}
