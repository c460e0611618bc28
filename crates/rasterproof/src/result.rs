//! Result and error types for Rasterproof.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Rasterproof operations
pub type RasterproofResult<T> = Result<T, RasterproofError>;

/// Errors that can occur in Rasterproof
///
/// Item-level errors (transform, structural, rasterize, decode, timeout) are
/// turned into `Failed` verdicts by the orchestrator. The remaining variants
/// describe environment problems and abort the whole run, see
/// [`RasterproofError::is_fatal`].
#[derive(Debug, Error)]
pub enum RasterproofError {
    /// The transform collaborator failed to produce an output document
    #[error("Transform failed: {message}")]
    Transform {
        /// Error message
        message: String,
    },

    /// The rasterizer rejected a document as structurally broken
    #[error("Structural check failed: {message}")]
    Structural {
        /// Error message
        message: String,
    },

    /// The rasterizer could not render a document into page images
    #[error("Rasterization failed: {message}")]
    Rasterize {
        /// Error message
        message: String,
    },

    /// An external tool did not finish in time
    #[error("External tool timeout: {tool} did not finish within {seconds}s")]
    Timeout {
        /// Tool name
        tool: String,
        /// Timeout in seconds
        seconds: u64,
    },

    /// A raster file could not be read or decoded
    #[error("Failed to decode image {}: {message}", path.display())]
    ImageDecode {
        /// Image path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A diagnostic image could not be encoded or written
    #[error("Failed to encode image {}: {message}", path.display())]
    ImageEncode {
        /// Image path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The regression ledger could not be read or written
    #[error("Ledger I/O failed for {}: {message}", path.display())]
    Ledger {
        /// Ledger path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A working directory could not be created
    #[error("Working directory {} unavailable: {message}", path.display())]
    WorkDir {
        /// Directory path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Tolerance profile outside its valid domain
    #[error("Invalid tolerance: {message}")]
    InvalidTolerance {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// The transform output would overwrite a corpus file
    #[error("Refusing to overwrite corpus file {}", path.display())]
    OutputOverwritesInput {
        /// Corpus path
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl RasterproofError {
    /// Create a transform error
    #[must_use]
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Create a structural error
    #[must_use]
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Create a rasterize error
    #[must_use]
    pub fn rasterize(message: impl Into<String>) -> Self {
        Self::Rasterize {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a ledger error
    #[must_use]
    pub fn ledger(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Ledger {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole corpus run.
    ///
    /// Ledger, working directory, configuration and raw I/O problems point at
    /// the environment rather than at a single corpus item.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Ledger { .. }
                | Self::WorkDir { .. }
                | Self::Config { .. }
                | Self::InvalidTolerance { .. }
                | Self::OutputOverwritesInput { .. }
                | Self::Io(_)
                | Self::Json(_)
                | Self::Yaml(_)
        )
    }
}
