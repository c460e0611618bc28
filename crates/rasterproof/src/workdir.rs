//! Per-item scratch directories.

use crate::result::{RasterproofError, RasterproofResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A uniquely named scratch directory for one corpus item.
///
/// The directory is removed when the value is dropped, on every exit path,
/// unless it was created with `keep`.
#[derive(Debug)]
pub struct WorkDir {
    inner: Option<TempDir>,
    path: PathBuf,
}

impl WorkDir {
    /// Create a directory named `<prefix>.<random>` under `base`
    ///
    /// # Errors
    ///
    /// Returns `WorkDir` if `base` or the directory cannot be created
    pub fn create(base: &Path, prefix: &str, keep: bool) -> RasterproofResult<Self> {
        let to_err = |e: std::io::Error| RasterproofError::WorkDir {
            path: base.to_path_buf(),
            message: e.to_string(),
        };
        std::fs::create_dir_all(base).map_err(to_err)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{prefix}."))
            .tempdir_in(base)
            .map_err(to_err)?;

        if keep {
            let path = dir.keep();
            tracing::info!(path = %path.display(), "keeping intermediates");
            Ok(Self { inner: None, path })
        } else {
            let path = dir.path().to_path_buf();
            Ok(Self {
                inner: Some(dir),
                path,
            })
        }
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (if needed) and return a named subdirectory
    ///
    /// # Errors
    ///
    /// Returns `WorkDir` if the subdirectory cannot be created
    pub fn subdir(&self, name: &str) -> RasterproofResult<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| RasterproofError::WorkDir {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        Ok(dir)
    }

    /// Whether the directory outlives this value
    #[must_use]
    pub const fn is_kept(&self) -> bool {
        self.inner.is_none()
    }
}
