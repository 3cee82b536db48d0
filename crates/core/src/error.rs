use crate::catalog::FileSummary;
use std::fmt;
use std::path::PathBuf;

/// Where a lookup failed.
///
/// Kept separate so a missing catalog entry can be told apart from a catalog
/// entry whose bytes have vanished from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Metadata,
    Disk,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Metadata => write!(f, "File not found in metadata"),
            NotFoundKind::Disk => write!(f, "File not found on disk"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("failed to serialize index: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to write index file {path}: {source}", path = path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FileShareError {
    #[error("invalid filename: {0}")]
    InvalidName(String),
    #[error("{0}")]
    NotFound(NotFoundKind),
    #[error("failed to create upload directory: {0}")]
    UploadDirCreation(std::io::Error),
    /// The client's body stream failed before it finished.
    #[error("failed to receive upload {filename}: {source}")]
    BodyRead {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {filename}: {source}")]
    DiskWrite {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file {filename}: {source}")]
    DiskRead {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to scan upload directory: {0}")]
    DirectoryScan(std::io::Error),
    /// The disk side of the operation happened but the index could not be
    /// rewritten. `stored` is set when the failure followed an upload.
    #[error("failed to save metadata: {source}")]
    MetadataPersist {
        stored: Option<FileSummary>,
        #[source]
        source: IndexError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type FileShareResult<T> = std::result::Result<T, FileShareError>;
