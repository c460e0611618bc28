//! Page image naming convention shared by rasterizers and scanners.
//!
//! A rasterizer writes one file per page named `prefix-NNN.ext`, 1-indexed and
//! zero padded to three digits.

use crate::result::{RasterproofError, RasterproofResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Naming scheme for per-page raster files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNaming {
    /// File name prefix before the page number
    pub prefix: String,
    /// File extension without the dot
    pub extension: String,
}

impl Default for PageNaming {
    fn default() -> Self {
        Self {
            prefix: String::from("doc"),
            extension: String::from("png"),
        }
    }
}

impl PageNaming {
    /// Create a naming scheme
    #[must_use]
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// File name of page `page` (1-indexed)
    #[must_use]
    pub fn file_name(&self, page: u32) -> String {
        format!("{}-{page:03}.{}", self.prefix, self.extension)
    }

    /// printf-style output template handed to the rasterizer
    #[must_use]
    pub fn output_template(&self) -> String {
        format!("{}-%03d.{}", self.prefix, self.extension)
    }

    /// Glob pattern matching every page file of this scheme
    #[must_use]
    pub fn glob_pattern(&self) -> String {
        format!("{}-*.{}", self.prefix, self.extension)
    }

    fn regex(&self) -> Option<Regex> {
        let pattern = format!(
            r"^{}-(\d+)\.{}$",
            regex::escape(&self.prefix),
            regex::escape(&self.extension)
        );
        Regex::new(&pattern).ok()
    }

    /// Page number encoded in `path`'s file name, if it follows the scheme
    #[must_use]
    pub fn page_number(&self, path: &Path) -> Option<u32> {
        page_number_with(&self.regex()?, path)
    }

    /// List the page files in `dir`, ordered by page number then file name.
    ///
    /// # Errors
    ///
    /// Returns `Rasterize` if the directory pattern is not a valid glob
    pub fn list_pages(&self, dir: &Path) -> RasterproofResult<Vec<PathBuf>> {
        let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
        let pattern = Path::new(&escaped_dir).join(self.glob_pattern());
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| {
            RasterproofError::rasterize(format!("invalid page pattern {pattern}: {e}"))
        })?;

        let Some(re) = self.regex() else {
            return Ok(Vec::new());
        };
        let mut pages: Vec<(u32, PathBuf)> = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .filter_map(|p| page_number_with(&re, &p).map(|n| (n, p)))
            .collect();
        pages.sort();
        Ok(pages.into_iter().map(|(_, p)| p).collect())
    }
}

fn page_number_with(re: &Regex, path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    re.captures(name)?.get(1)?.as_str().parse().ok()
}
