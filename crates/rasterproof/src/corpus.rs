//! Corpus discovery and ordering.

use crate::config::SizeRange;
use crate::ledger::{Ledger, TestRecord};
use crate::result::{RasterproofError, RasterproofResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One input document under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusItem {
    /// Document path
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

impl CorpusItem {
    /// Stat `path` into an item
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be inspected
    pub fn from_path(path: impl Into<PathBuf>) -> RasterproofResult<Self> {
        let path = path.into();
        let size_bytes = std::fs::metadata(&path)?.len();
        Ok(Self { path, size_bytes })
    }

    /// File name used as the test name and ledger key
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned()
    }
}

/// Expand glob `patterns` into corpus items. Entries that are not regular
/// files are skipped.
///
/// # Errors
///
/// Returns `Config` for an invalid glob pattern
pub fn discover<S: AsRef<str>>(patterns: &[S]) -> RasterproofResult<Vec<CorpusItem>> {
    let mut items = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let paths = glob::glob(pattern)
            .map_err(|e| RasterproofError::config(format!("invalid pattern {pattern}: {e}")))?;
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("skipping unreadable corpus entry: {e}");
                    continue;
                }
            };
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => items.push(CorpusItem {
                    path,
                    size_bytes: meta.len(),
                }),
                Ok(_) => tracing::info!(path = %path.display(), "skipping non-regular file"),
                Err(e) => tracing::warn!(path = %path.display(), "skipping corpus entry: {e}"),
            }
        }
    }
    Ok(items)
}

/// Sort by ascending size then path, keeping items inside `range`.
#[must_use]
pub fn sort_and_filter(mut items: Vec<CorpusItem>, range: SizeRange) -> Vec<CorpusItem> {
    items.retain(|item| range.contains(item.size_bytes));
    items.sort_by(|a, b| {
        a.size_bytes
            .cmp(&b.size_bytes)
            .then_with(|| a.path.cmp(&b.path))
    });
    items.dedup_by(|a, b| a.path == b.path);
    items
}

/// Read a bad-list file back as a corpus. Blank lines and `#` comments are
/// ignored. Listed files that no longer exist are skipped with a warning.
///
/// # Errors
///
/// Returns `Io` if the list cannot be read
pub fn from_bad_list(path: &Path) -> RasterproofResult<Vec<CorpusItem>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match CorpusItem::from_path(line) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(path = line, "bad-list entry unavailable: {e}");
                None
            }
        })
        .collect())
}

/// Select ledger records matching `predicate` and resolve their names under
/// `root`. Names with no file under `root` are skipped.
#[must_use]
pub fn from_ledger(
    ledger: &Ledger,
    root: &Path,
    predicate: impl Fn(&TestRecord) -> bool,
) -> Vec<CorpusItem> {
    ledger
        .select(predicate)
        .filter_map(|record| {
            let path = root.join(&record.name);
            match CorpusItem::from_path(&path) {
                Ok(item) => Some(item),
                Err(_) => {
                    tracing::debug!(path = %path.display(), "ledger entry has no corpus file");
                    None
                }
            }
        })
        .collect()
}
