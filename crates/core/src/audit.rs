//! Reconciliation between the catalog and the upload directory.
//!
//! A failed index write after an upload leaves bytes on disk the index does
//! not know about; external edits can leave index entries with no bytes. The
//! audit reports both so an operator can fix things by hand.

use crate::catalog::FileRecord;
use crate::names;
use crate::{FileShareError, FileShareResult};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Catalog entries whose storage path is not a regular file.
    pub missing_on_disk: Vec<String>,
    /// Regular files in the upload directory no catalog entry points at.
    pub untracked_on_disk: Vec<String>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_on_disk.is_empty() && self.untracked_on_disk.is_empty()
    }
}

pub(crate) async fn compare(
    records: &[FileRecord],
    upload_dir: &Path,
    index_file: &Path,
) -> FileShareResult<AuditReport> {
    let mut report = AuditReport::default();
    let mut tracked = HashSet::new();

    for record in records {
        let is_file = tokio::fs::metadata(&record.storage_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            report.missing_on_disk.push(record.filename.clone());
        }
        if let Some(name) = record.storage_path.file_name() {
            tracked.insert(name.to_os_string());
        }
    }

    let index_name = index_file.file_name().map(|n| n.to_os_string());

    let mut entries = tokio::fs::read_dir(upload_dir)
        .await
        .map_err(FileShareError::DirectoryScan)?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(FileShareError::DirectoryScan)?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(FileShareError::DirectoryScan)?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name();
        if tracked.contains(&name)
            || index_name.as_ref() == Some(&name)
            || names::is_staging_name(&name.to_string_lossy())
        {
            continue;
        }
        report
            .untracked_on_disk
            .push(name.to_string_lossy().into_owned());
    }

    report.untracked_on_disk.sort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_compare_reports_both_directions() {
        let temp = TempDir::new().unwrap();
        let uploads = temp.path().join("uploads");
        fs::create_dir_all(uploads.join("nested")).unwrap();
        fs::write(uploads.join("present.txt"), b"1").unwrap();
        fs::write(uploads.join("stray.txt"), b"2").unwrap();
        fs::write(uploads.join(names::staging_name(5, 0)), b"in flight").unwrap();

        let records = vec![
            FileRecord {
                filename: "present.txt".into(),
                size: 1,
                storage_path: uploads.join("present.txt"),
            },
            FileRecord {
                filename: "lost.txt".into(),
                size: 1,
                storage_path: uploads.join("lost.txt"),
            },
        ];

        let report = compare(&records, &uploads, &temp.path().join("filedata.json"))
            .await
            .unwrap();

        assert_eq!(report.missing_on_disk, vec!["lost.txt".to_string()]);
        assert_eq!(report.untracked_on_disk, vec!["stray.txt".to_string()]);
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn test_compare_ignores_index_in_upload_dir() {
        let temp = TempDir::new().unwrap();
        let uploads = temp.path().join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("filedata.json"), b"{}").unwrap();

        let report = compare(&[], &uploads, &uploads.join("filedata.json"))
            .await
            .unwrap();

        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn test_compare_missing_upload_dir_is_error() {
        let temp = TempDir::new().unwrap();

        let result = compare(&[], &temp.path().join("nope"), &temp.path().join("i.json")).await;

        assert!(matches!(result, Err(FileShareError::DirectoryScan(_))));
    }
}
