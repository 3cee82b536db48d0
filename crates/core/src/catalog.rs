//! In-memory catalog of stored files.
//!
//! The catalog is the authoritative view of what is stored while the process
//! runs. It carries no lock of its own; [`FileService`](crate::FileService)
//! owns it behind a single mutex, so every method here runs with exclusive
//! access already held.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One tracked file.
///
/// This is the persisted shape; `storage_path` never leaves the process in a
/// client-facing response (see [`FileSummary`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Sanitised, possibly disambiguated base name. Unique within the catalog.
    pub filename: String,

    /// Byte length recorded at upload time.
    pub size: u64,

    /// Where the bytes live on disk.
    #[serde(rename = "path")]
    pub storage_path: PathBuf,
}

impl FileRecord {
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            filename: self.filename.clone(),
            size: self.size,
        }
    }
}

/// Client-facing view of a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub filename: String,
    pub size: u64,
}

/// Ordered collection of [`FileRecord`]s, in insertion order.
#[derive(Debug, Default)]
pub struct Catalog {
    records: Vec<FileRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from records loaded out of the index.
    pub fn from_records(records: Vec<FileRecord>) -> Self {
        Self { records }
    }

    pub fn list_all(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn summaries(&self) -> Vec<FileSummary> {
        self.records.iter().map(FileRecord::summary).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.filename == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Append a record. The caller is responsible for filename uniqueness.
    pub fn insert(&mut self, record: FileRecord) {
        self.records.push(record);
    }

    /// Remove the record named `name`, returning it if it was present.
    pub fn remove_by_name(&mut self, name: &str) -> Option<FileRecord> {
        let position = self.records.iter().position(|r| r.filename == name)?;
        Some(self.records.remove(position))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
