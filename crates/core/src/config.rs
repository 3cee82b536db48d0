//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into
//! [`FileService`](crate::FileService). Nothing in the request path reads the
//! process environment.

use crate::constants::{DEFAULT_INDEX_FILE, DEFAULT_UPLOAD_DIR};
use crate::{FileShareError, FileShareResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    upload_dir: PathBuf,
    index_file: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`FileShareError::InvalidConfig`] if either path is empty or the
    /// index path names an existing directory.
    pub fn new(upload_dir: PathBuf, index_file: PathBuf) -> FileShareResult<Self> {
        if upload_dir.as_os_str().is_empty() {
            return Err(FileShareError::InvalidConfig(
                "upload directory cannot be empty".into(),
            ));
        }
        if index_file.as_os_str().is_empty() {
            return Err(FileShareError::InvalidConfig(
                "index file cannot be empty".into(),
            ));
        }
        if index_file.is_dir() {
            return Err(FileShareError::InvalidConfig(format!(
                "index file path is a directory: {}",
                index_file.display()
            )));
        }

        Ok(Self {
            upload_dir,
            index_file,
        })
    }

    /// Build a config from raw environment values, falling back to defaults
    /// for anything missing or blank.
    pub fn from_env_values(
        upload_dir: Option<String>,
        index_file: Option<String>,
    ) -> FileShareResult<Self> {
        fn or_default(value: Option<String>, default: &str) -> PathBuf {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        }

        Self::new(
            or_default(upload_dir, DEFAULT_UPLOAD_DIR),
            or_default(index_file, DEFAULT_INDEX_FILE),
        )
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// Storage path for a resolved filename. The upload directory is flat.
    pub fn storage_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }
}
