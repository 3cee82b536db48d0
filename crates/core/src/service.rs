//! File operations service.
//!
//! [`FileService`] keeps three things in step: the bytes in the upload
//! directory, the in-memory [`Catalog`], and the JSON [`PersistentIndex`].
//!
//! # Locking
//!
//! One `tokio::sync::Mutex` guards the whole catalog. Every operation takes it
//! for its full duration, including the disk rename or removal and the index
//! rewrite, so operations never interleave and the index on disk always
//! reflects exactly one operation's effect. Slow disks therefore block all
//! catalog access; that is accepted at small-team scale.
//!
//! Upload bodies are received into a staging file in the upload directory
//! before the lock is taken, so a slow client only holds up its own request.
//!
//! # Failure policy
//!
//! - Upload body or write failure: no catalog entry, staging file removed.
//! - Upload persist failure: the catalog keeps the record, the caller gets
//!   [`FileShareError::MetadataPersist`] naming what was stored.
//! - Delete disk failure (other than already-absent): logged, metadata removal
//!   still proceeds.
//! - Delete persist failure: [`FileShareError::MetadataPersist`].

use crate::audit::{self, AuditReport};
use crate::catalog::{Catalog, FileRecord, FileSummary};
use crate::config::CoreConfig;
use crate::index::PersistentIndex;
use crate::names;
use crate::{FileShareError, FileShareResult, NotFoundKind};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// An open stored file ready to be streamed to a client.
#[derive(Debug)]
pub struct Download {
    /// Name to suggest to the client when saving.
    pub filename: String,
    /// Current length on disk.
    pub size: u64,
    /// Handle opened for reading, positioned at the start.
    pub file: fs::File,
}

/// Service owning the catalog and its persistence.
///
/// Construct once at startup with [`FileService::init`] and share behind an
/// `Arc`. There is no teardown: every mutation is flushed before it returns.
#[derive(Debug)]
pub struct FileService {
    cfg: Arc<CoreConfig>,
    index: PersistentIndex,
    catalog: Mutex<Catalog>,
}

impl FileService {
    /// Create the upload directory if needed and load the catalog from the
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`FileShareError::UploadDirCreation`] if the upload directory
    /// cannot be created. Index problems and leftover staging files from an
    /// earlier run are logged, not returned.
    pub async fn init(cfg: Arc<CoreConfig>) -> FileShareResult<Self> {
        fs::create_dir_all(cfg.upload_dir())
            .await
            .map_err(FileShareError::UploadDirCreation)?;
        remove_stale_staging(cfg.upload_dir()).await;

        let index = PersistentIndex::new(cfg.index_file(), cfg.upload_dir());
        let records = index.load().await;

        Ok(Self {
            cfg,
            index,
            catalog: Mutex::new(Catalog::from_records(records)),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Store an uploaded file.
    ///
    /// The raw name is sanitised to its base name and the body is received
    /// into a staging file without holding the catalog lock. Under the lock,
    /// if the name is already taken (in the catalog or on disk) a nanosecond
    /// timestamp is inserted before the extension until it is free, and the
    /// staged file is renamed into place.
    ///
    /// # Arguments
    ///
    /// * `raw_filename` - Filename as sent by the client
    /// * `body` - The file bytes
    ///
    /// # Returns
    ///
    /// The final stored filename and the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`FileShareError::InvalidName`] if nothing usable remains after sanitising
    /// - [`FileShareError::BodyRead`] if `body` fails before it ends
    /// - [`FileShareError::DiskWrite`] if the bytes could not be written or moved
    ///   into place
    /// - [`FileShareError::MetadataPersist`] if the file was stored but the index
    ///   could not be rewritten
    pub async fn upload<R>(&self, raw_filename: &str, mut body: R) -> FileShareResult<FileSummary>
    where
        R: AsyncRead + Unpin,
    {
        let sanitized = names::sanitize_filename(raw_filename).map_err(|e| {
            tracing::warn!("rejected upload with invalid filename {:?}", raw_filename);
            e
        })?;
        tracing::debug!("upload {:?} sanitized to {:?}", raw_filename, sanitized);

        fs::create_dir_all(self.cfg.upload_dir())
            .await
            .map_err(FileShareError::UploadDirCreation)?;

        let staging_path = self.cfg.storage_path(&names::staging_name(
            names::disambiguation_stamp(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed),
        ));
        let size = stage_body(&staging_path, &mut body)
            .await
            .map_err(|e| match e {
                StageError::Body(source) => {
                    tracing::warn!("upload of {} interrupted: {}", sanitized, source);
                    FileShareError::BodyRead {
                        filename: sanitized.clone(),
                        source,
                    }
                }
                StageError::Disk(source) => {
                    tracing::error!("failed to stage {}: {}", sanitized, source);
                    FileShareError::DiskWrite {
                        filename: sanitized.clone(),
                        source,
                    }
                }
            })?;
        tracing::debug!("staged {} at {} ({} bytes)", sanitized, staging_path.display(), size);

        let mut catalog = self.catalog.lock().await;

        let mut filename = sanitized.clone();
        while self.is_taken(&catalog, &filename).await {
            let renamed = names::disambiguate(&sanitized, names::disambiguation_stamp());
            tracing::debug!("{:?} already exists, trying {:?}", filename, renamed);
            filename = renamed;
        }

        let storage_path = self.cfg.storage_path(&filename);
        if let Err(source) = fs::rename(&staging_path, &storage_path).await {
            tracing::error!("failed to move upload to {}: {}", storage_path.display(), source);
            discard_file(&staging_path).await;
            return Err(FileShareError::DiskWrite { filename, source });
        }
        tracing::debug!("saved {} ({} bytes)", storage_path.display(), size);

        let record = FileRecord {
            filename,
            size,
            storage_path,
        };
        let summary = record.summary();
        catalog.insert(record);

        if let Err(source) = self.index.persist(catalog.list_all()).await {
            tracing::error!(
                "stored {} but failed to save metadata: {}",
                summary.filename,
                source
            );
            return Err(FileShareError::MetadataPersist {
                stored: Some(summary),
                source,
            });
        }

        tracing::info!("uploaded {} ({} bytes)", summary.filename, summary.size);
        Ok(summary)
    }

    async fn is_taken(&self, catalog: &Catalog, filename: &str) -> bool {
        catalog.contains(filename)
            || fs::try_exists(self.cfg.storage_path(filename))
                .await
                .unwrap_or(false)
    }

    /// Snapshot of every stored file, in upload order.
    ///
    /// Does not check the disk: an entry whose bytes were removed externally
    /// is still listed until it is deleted.
    pub async fn list(&self) -> Vec<FileSummary> {
        let catalog = self.catalog.lock().await;
        tracing::debug!("listing files, total count: {}", catalog.len());
        catalog.summaries()
    }

    /// Open a stored file for streaming.
    ///
    /// # Arguments
    ///
    /// * `requested_filename` - URL-encoded filename from the request path
    ///
    /// # Errors
    ///
    /// - [`FileShareError::InvalidName`] if the name does not decode
    /// - [`FileShareError::NotFound`] with [`NotFoundKind::Metadata`] if no
    ///   catalog entry matches, or [`NotFoundKind::Disk`] if the entry's bytes
    ///   are gone
    /// - [`FileShareError::DiskRead`] if the file exists but cannot be opened
    pub async fn download(&self, requested_filename: &str) -> FileShareResult<Download> {
        let name = names::decode_requested_name(requested_filename)?;

        let catalog = self.catalog.lock().await;
        let record = catalog.find_by_name(&name).ok_or_else(|| {
            tracing::debug!("download of {:?}: no match in metadata", name);
            FileShareError::NotFound(NotFoundKind::Metadata)
        })?;

        let file = match fs::File::open(&record.storage_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    "{} is in metadata but missing on disk at {}",
                    record.filename,
                    record.storage_path.display()
                );
                return Err(FileShareError::NotFound(NotFoundKind::Disk));
            }
            Err(source) => {
                return Err(FileShareError::DiskRead {
                    filename: record.filename.clone(),
                    source,
                })
            }
        };

        let metadata = file
            .metadata()
            .await
            .map_err(|source| FileShareError::DiskRead {
                filename: record.filename.clone(),
                source,
            })?;
        if !metadata.is_file() {
            return Err(FileShareError::NotFound(NotFoundKind::Disk));
        }

        tracing::debug!("serving {} from {}", record.filename, record.storage_path.display());
        Ok(Download {
            filename: record.filename.clone(),
            size: metadata.len(),
            file,
        })
    }

    /// Delete a stored file from disk, catalog and index.
    ///
    /// A file already missing from disk is not an error, and other removal
    /// errors are only logged: a catalog entry pointing nowhere is worse than
    /// a stray file.
    ///
    /// # Returns
    ///
    /// The remaining files, in upload order.
    ///
    /// # Errors
    ///
    /// - [`FileShareError::InvalidName`] if the name does not decode
    /// - [`FileShareError::NotFound`] ([`NotFoundKind::Metadata`]) if no entry matches
    /// - [`FileShareError::MetadataPersist`] if the index could not be rewritten
    pub async fn delete(&self, requested_filename: &str) -> FileShareResult<Vec<FileSummary>> {
        let name = names::decode_requested_name(requested_filename)?;

        let mut catalog = self.catalog.lock().await;
        let storage_path = match catalog.find_by_name(&name) {
            Some(record) => record.storage_path.clone(),
            None => return Err(FileShareError::NotFound(NotFoundKind::Metadata)),
        };

        match fs::remove_file(&storage_path).await {
            Ok(()) => tracing::debug!("removed {} from disk", storage_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} was already gone from disk", storage_path.display())
            }
            Err(e) => tracing::warn!(
                "could not delete {} from disk: {}",
                storage_path.display(),
                e
            ),
        }

        catalog.remove_by_name(&name);

        if let Err(source) = self.index.persist(catalog.list_all()).await {
            tracing::error!("deleted {} but failed to save metadata: {}", name, source);
            return Err(FileShareError::MetadataPersist {
                stored: None,
                source,
            });
        }

        tracing::info!("deleted {}", name);
        Ok(catalog.summaries())
    }

    /// Compare the catalog against the upload directory.
    ///
    /// # Errors
    ///
    /// Returns [`FileShareError::DirectoryScan`] if the upload directory cannot
    /// be listed.
    pub async fn audit(&self) -> FileShareResult<AuditReport> {
        let catalog = self.catalog.lock().await;
        audit::compare(
            catalog.list_all(),
            self.cfg.upload_dir(),
            self.index.path(),
        )
        .await
    }
}

enum StageError {
    Body(std::io::Error),
    Disk(std::io::Error),
}

/// Create `path` (which must not exist) and copy `body` into it.
///
/// On failure the partial file is removed, best effort.
async fn stage_body<R>(path: &Path, body: &mut R) -> Result<u64, StageError>
where
    R: AsyncRead + Unpin,
{
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(StageError::Disk)?;

    let written = copy_body(body, &mut file).await;
    if written.is_err() {
        drop(file);
        discard_file(path).await;
    }
    written
}

async fn copy_body<R>(body: &mut R, file: &mut fs::File) -> Result<u64, StageError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = body.read(&mut buf).await.map_err(StageError::Body)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await.map_err(StageError::Disk)?;
        written += n as u64;
    }
    file.flush().await.map_err(StageError::Disk)?;
    file.sync_all().await.map_err(StageError::Disk)?;
    Ok(written)
}

async fn discard_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("failed to remove partial upload {}: {}", path.display(), e);
        }
    }
}

/// Remove staging files left behind by an interrupted run.
async fn remove_stale_staging(upload_dir: &Path) {
    let mut entries = match fs::read_dir(upload_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("could not scan {} for stale uploads: {}", upload_dir.display(), e);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if names::is_staging_name(&name.to_string_lossy()) {
            tracing::warn!("removing stale partial upload {}", entry.path().display());
            discard_file(&entry.path()).await;
        }
    }
}
