//! # Fileshare Core
//!
//! Core data operations for the file-sharing server.
//!
//! This crate keeps uploaded files, the in-memory catalog and the JSON index
//! consistent under concurrent requests:
//! - Upload with name sanitisation and collision renaming
//! - Listing, download lookup and deletion
//! - Snapshot persistence of the catalog to a JSON sidecar
//!
//! **No API concerns**: authentication, HTTP servers and static assets belong
//! in `api-rest`.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod index;
pub mod names;
pub mod service;

pub use audit::AuditReport;
pub use catalog::{Catalog, FileRecord, FileSummary};
pub use config::CoreConfig;
pub use constants::{DEFAULT_INDEX_FILE, DEFAULT_UPLOAD_DIR};
pub use error::{FileShareError, FileShareResult, IndexError, NotFoundKind};
pub use index::PersistentIndex;
pub use service::{Download, FileService};
