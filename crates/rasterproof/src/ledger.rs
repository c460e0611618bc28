//! Regression ledger: durable per-test outcome records.
//!
//! The ledger is an ordered map from test name to the most recent
//! [`TestRecord`], stored as a CSV table with the header
//! `name,colorIn,colorOut,numPages,duration,imageXobj,formXobj`.
//!
//! Re-recording a known name replaces the row in place, keeping its position.
//! With write-through enabled (the default for file-backed ledgers) every
//! upsert rewrites the file, so a crash loses at most the record in flight.

use crate::result::{RasterproofError, RasterproofResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default ledger file name
pub const DEFAULT_LEDGER_FILE: &str = "xform.test.results.csv";

/// Column order of the ledger table
pub const LEDGER_HEADER: [&str; 7] = [
    "name",
    "colorIn",
    "colorOut",
    "numPages",
    "duration",
    "imageXobj",
    "formXobj",
];

/// Persisted outcome and metadata of one named test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Test name (unique key)
    pub name: String,
    /// Original document has color
    #[serde(rename = "colorIn", deserialize_with = "deserialize_flag")]
    pub color_in: bool,
    /// Transformed document has color
    #[serde(rename = "colorOut", deserialize_with = "deserialize_flag")]
    pub color_out: bool,
    /// Number of pages
    #[serde(rename = "numPages", deserialize_with = "deserialize_count")]
    pub num_pages: u32,
    /// Transform duration in seconds, held at millisecond precision
    #[serde(
        rename = "duration",
        serialize_with = "serialize_seconds",
        deserialize_with = "deserialize_seconds"
    )]
    pub duration_secs: f64,
    /// Image objects seen by the transform
    #[serde(rename = "imageXobj", deserialize_with = "deserialize_count")]
    pub image_objects: u32,
    /// Form objects seen by the transform
    #[serde(rename = "formXobj", deserialize_with = "deserialize_count")]
    pub form_objects: u32,
}

impl TestRecord {
    /// Create a record with zeroed statistics
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color_in: false,
            color_out: false,
            num_pages: 0,
            duration_secs: 0.0,
            image_objects: 0,
            form_objects: 0,
        }
    }

    /// Set color flags
    #[must_use]
    pub const fn with_colors(mut self, color_in: bool, color_out: bool) -> Self {
        self.color_in = color_in;
        self.color_out = color_out;
        self
    }

    /// Set page count
    #[must_use]
    pub const fn with_pages(mut self, num_pages: u32) -> Self {
        self.num_pages = num_pages;
        self
    }

    /// Set duration in seconds, rounded to the millisecond the file keeps
    #[must_use]
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = round_seconds(secs);
        self
    }

    /// Set object counts
    #[must_use]
    pub const fn with_objects(mut self, images: u32, forms: u32) -> Self {
        self.image_objects = images;
        self.form_objects = forms;
        self
    }
}

/// Round through the stored text form so memory and file agree
fn round_seconds(secs: f64) -> f64 {
    format!("{secs:.3}").parse().unwrap_or(secs)
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_seconds<S: Serializer>(secs: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{secs:.3}"))
}

fn deserialize_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.trim().parse().map_err(serde::de::Error::custom)
}

// Value columns tolerate hand-edited padding; `name` is the key and is kept verbatim.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected true or false, got {other:?}"
        ))),
    }
}

fn deserialize_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.trim().parse().map_err(serde::de::Error::custom)
}

/// Ordered, name-indexed store of [`TestRecord`]s
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    path: Option<PathBuf>,
    records: Vec<TestRecord>,
    index: HashMap<String, usize>,
    write_through: bool,
    dirty: bool,
}

impl Ledger {
    /// Create an empty ledger that is never persisted
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load a ledger from `path`. A missing file yields an empty ledger bound
    /// to `path` with write-through enabled.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` if the file exists but cannot be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> RasterproofResult<Self> {
        let path = path.into();
        let mut ledger = Self {
            path: Some(path.clone()),
            write_through: true,
            ..Self::default()
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no ledger yet, starting empty");
            return Ok(ledger);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(&path)
            .map_err(|e| RasterproofError::ledger(&path, e.to_string()))?;

        for (row, record) in reader.deserialize::<TestRecord>().enumerate() {
            let record = record
                .map_err(|e| RasterproofError::ledger(&path, format!("row {}: {e}", row + 1)))?;
            ledger.insert(record);
        }
        ledger.dirty = false;

        tracing::debug!(path = %path.display(), records = ledger.len(), "ledger loaded");
        Ok(ledger)
    }

    /// Enable or disable saving after every upsert
    #[must_use]
    pub const fn with_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn insert(&mut self, mut record: TestRecord) {
        record.duration_secs = round_seconds(record.duration_secs);
        if let Some(&i) = self.index.get(&record.name) {
            self.records[i] = record;
        } else {
            self.index.insert(record.name.clone(), self.records.len());
            self.records.push(record);
        }
        self.dirty = true;
    }

    /// Insert or replace the record named `record.name`, keeping the position
    /// of an existing entry. Saves immediately when write-through is on.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` if the write-through save fails
    pub fn upsert(&mut self, record: TestRecord) -> RasterproofResult<()> {
        self.insert(record);
        if self.write_through {
            self.save()?;
        }
        Ok(())
    }

    /// Record by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestRecord> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    /// Records in insertion order
    #[must_use]
    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Iterate records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching `predicate`, in ledger order
    pub fn select<'a>(
        &'a self,
        predicate: impl Fn(&TestRecord) -> bool + 'a,
    ) -> impl Iterator<Item = &'a TestRecord> + 'a {
        self.records.iter().filter(move |r| predicate(r))
    }

    /// Write the whole ledger to its backing file, if it has one.
    ///
    /// The table is written to a sibling temporary file and renamed over the
    /// ledger so readers never see a half-written table.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` on any I/O or encoding failure
    pub fn save(&mut self) -> RasterproofResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        self.save_to(&path)?;
        self.dirty = false;
        Ok(())
    }

    /// Write the ledger to `path` without changing its backing file.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` on any I/O or encoding failure
    pub fn save_to(&self, path: &Path) -> RasterproofResult<()> {
        let to_err = |e: &dyn std::fmt::Display| RasterproofError::ledger(path, e.to_string());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| to_err(&e))?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)
                .map_err(|e| to_err(&e))?;
            writer.write_record(LEDGER_HEADER).map_err(|e| to_err(&e))?;
            for record in &self.records {
                writer.serialize(record).map_err(|e| to_err(&e))?;
            }
            writer.flush().map_err(|e| to_err(&e))?;
        }

        std::fs::rename(&tmp, path).map_err(|e| to_err(&e))?;
        Ok(())
    }

    /// Save if anything changed since the last save
    ///
    /// # Errors
    ///
    /// Returns `Ledger` if saving fails
    pub fn flush(&mut self) -> RasterproofResult<()> {
        if self.dirty {
            self.save()?;
        }
        Ok(())
    }
}
