//! Constants used throughout the fileshare core crate.
//!
//! Default storage locations live here so the binaries and tests agree on them.

/// Default flat directory holding uploaded file bytes.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Default location of the JSON index sidecar.
pub const DEFAULT_INDEX_FILE: &str = "./filedata.json";

/// Suffix appended to the index path for the in-progress snapshot.
pub const INDEX_TEMP_SUFFIX: &str = ".tmp";

/// Top-level key of the index document.
pub const INDEX_FILES_KEY: &str = "files";

/// Prefix of the in-progress upload files staged in the upload directory.
pub const STAGING_PREFIX: &str = ".fileshare-upload-";

/// Suffix of the in-progress upload files staged in the upload directory.
pub const STAGING_SUFFIX: &str = ".part";
