//! Persistent JSON index of stored files.
//!
//! The index is a full snapshot, rewritten on every mutation:
//!
//! ```text
//! {
//!   "files": [
//!     { "filename": "a.txt", "size": 12, "path": "./uploads/a.txt" }
//!   ]
//! }
//! ```
//!
//! Loading never fails the caller. A missing file is an empty catalog; an
//! unreadable or malformed file is logged and whatever entries still parse are
//! kept. Entries written without a `path` resolve to `<upload_dir>/<filename>`.

use crate::catalog::FileRecord;
use crate::constants::{INDEX_FILES_KEY, INDEX_TEMP_SUFFIX};
use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct IndexDocument<'a> {
    files: &'a [FileRecord],
}

#[derive(Deserialize)]
struct IndexEntry {
    filename: String,
    size: u64,
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Reads and writes the JSON snapshot at a fixed path.
#[derive(Debug, Clone)]
pub struct PersistentIndex {
    path: PathBuf,
    upload_dir: PathBuf,
}

impl PersistentIndex {
    /// # Arguments
    ///
    /// * `path` - Location of the index document
    /// * `upload_dir` - Directory used to resolve entries stored without a path
    pub fn new(path: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            upload_dir: upload_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record the index holds.
    ///
    /// Soft-fails: problems are logged and the best available state (possibly
    /// empty) is returned. Duplicate filenames keep their first occurrence.
    pub async fn load(&self) -> Vec<FileRecord> {
        tracing::debug!("loading index from {}", self.path.display());

        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "index file {} not found, starting fresh",
                    self.path.display()
                );
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("failed to read index file {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let mut document: serde_json::Value = match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("failed to parse index file {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let entries = match document
            .get_mut(INDEX_FILES_KEY)
            .map(serde_json::Value::take)
        {
            Some(serde_json::Value::Array(entries)) => entries,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(_) => {
                tracing::warn!(
                    "index file {} has a non-array \"{}\" field, ignoring it",
                    self.path.display(),
                    INDEX_FILES_KEY
                );
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(entries.len());
        for (position, value) in entries.into_iter().enumerate() {
            let entry: IndexEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping index entry {}: {}", position, e);
                    continue;
                }
            };

            if !seen.insert(entry.filename.clone()) {
                tracing::warn!("skipping duplicate index entry for {}", entry.filename);
                continue;
            }

            let storage_path = entry
                .path
                .unwrap_or_else(|| self.upload_dir.join(&entry.filename));
            records.push(FileRecord {
                filename: entry.filename,
                size: entry.size,
                storage_path,
            });
        }

        tracing::info!("index loaded, total files: {}", records.len());
        records
    }

    /// Overwrite the index with `records`.
    ///
    /// The snapshot is written to a sibling temp file and renamed into place,
    /// so readers only ever see a complete document. No retry.
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if serialisation, the temp write or the rename fails.
    pub async fn persist(&self, records: &[FileRecord]) -> Result<(), IndexError> {
        let data = serde_json::to_vec_pretty(&IndexDocument { files: records })
            .map_err(IndexError::Serialization)?;

        let temp_path = self.temp_path();
        if let Err(source) = tokio::fs::write(&temp_path, &data).await {
            return Err(IndexError::Write {
                path: temp_path,
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(&temp_path, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                tracing::warn!(
                    "failed to remove index temp file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(IndexError::Write {
                path: self.path.clone(),
                source,
            });
        }

        tracing::debug!(
            "index saved to {} ({} files)",
            self.path.display(),
            records.len()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(INDEX_TEMP_SUFFIX);
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(upload_dir: &Path, name: &str, size: u64) -> FileRecord {
        FileRecord {
            filename: name.to_string(),
            size,
            storage_path: upload_dir.join(name),
        }
    }

    fn index_in(temp: &TempDir) -> PersistentIndex {
        PersistentIndex::new(temp.path().join("filedata.json"), temp.path().join("uploads"))
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        assert!(index.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_then_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        let uploads = temp.path().join("uploads");
        let records = vec![
            record(&uploads, "b.txt", 2),
            record(&uploads, "a.txt", 12),
        ];

        index.persist(&records).await.unwrap();

        assert_eq!(index.load().await, records);
        assert!(!index.temp_path().exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        fs::create_dir_all(index.path().join("occupied")).unwrap();

        let result = index.persist(&[]).await;

        assert!(matches!(result, Err(IndexError::Write { .. })));
        assert!(!index.temp_path().exists());
    }

    #[tokio::test]
    async fn test_persist_writes_human_readable_document() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        let uploads = temp.path().join("uploads");

        index
            .persist(&[record(&uploads, "a.txt", 12)])
            .await
            .unwrap();

        let text = fs::read_to_string(index.path()).unwrap();
        assert!(text.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["files"][0]["filename"], "a.txt");
        assert_eq!(value["files"][0]["size"], 12);
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        fs::write(index.path(), "{ not json").unwrap();

        assert!(index.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_keeps_valid_entries() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        fs::write(
            index.path(),
            r#"{"files": [
                {"filename": "good.txt", "size": 3, "path": "/data/good.txt"},
                {"filename": "bad.txt", "size": "three"},
                {"filename": "good.txt", "size": 9},
                {"filename": "legacy.txt", "size": 5}
            ]}"#,
        )
        .unwrap();

        let records = index.load().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filename, "good.txt");
        assert_eq!(records[0].size, 3);
        assert_eq!(records[0].storage_path, PathBuf::from("/data/good.txt"));
        assert_eq!(records[1].filename, "legacy.txt");
        assert_eq!(
            records[1].storage_path,
            temp.path().join("uploads").join("legacy.txt")
        );
    }

    #[tokio::test]
    async fn test_load_null_files_is_empty() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp);
        fs::write(index.path(), r#"{"files": null}"#).unwrap();

        assert!(index.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_fails_when_parent_missing() {
        let temp = TempDir::new().unwrap();
        let index = PersistentIndex::new(
            temp.path().join("missing").join("filedata.json"),
            temp.path().join("uploads"),
        );

        let result = index.persist(&[]).await;

        assert!(matches!(result, Err(IndexError::Write { .. })));
    }
}
