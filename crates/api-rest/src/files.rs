//! File endpoints: upload, list, download and delete.
//!
//! Handlers translate HTTP to [`FileService`](fileshare_core::FileService)
//! calls and back. Path parameters are taken raw so the service decodes the
//! requested name exactly once.

use crate::error::ApiError;
use crate::AppState;
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, RawPathParams, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fileshare_core::{FileShareError, FileSummary};
use futures_util::TryStreamExt;
use serde::Serialize;
use std::io;
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::ToSchema;

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize, ToSchema)]
pub struct FileEntry {
    pub filename: String,
    pub size: u64,
}

impl From<FileSummary> for FileEntry {
    fn from(summary: FileSummary) -> Self {
        Self {
            filename: summary.filename,
            size: summary.size,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadRes {
    pub status: String,
    pub filename: String,
    pub size: u64,
}

fn entries(summaries: Vec<FileSummary>) -> Vec<FileEntry> {
    summaries.into_iter().map(FileEntry::from).collect()
}

fn filename_param(params: &RawPathParams) -> Result<&str, ApiError> {
    params
        .iter()
        .find(|(key, _)| *key == "filename")
        .map(|(_, value)| value)
        .ok_or_else(|| ApiError::BadRequest("Missing filename".into()))
}

/// True if a body stream failed because the request ran past the upload cap.
fn exceeds_body_limit(e: &MultipartError) -> bool {
    e.status() == StatusCode::PAYLOAD_TOO_LARGE
}

fn body_error_exceeds_limit(e: &io::Error) -> bool {
    e.get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .is_some_and(exceeds_body_limit)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content_type = "multipart/form-data", description = "Form with a `file` field"),
    responses(
        (status = 200, description = "File stored", body = UploadRes),
        (status = 400, description = "No file field or invalid filename"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 500, description = "File or metadata could not be saved")
    )
)]
/// Store the `file` field of a multipart form.
///
/// The original filename is sanitised and, on collision, renamed with a
/// timestamp suffix; the response carries the name actually stored. Fields
/// other than `file` are ignored. A body that runs past the upload cap is
/// rejected with 413 whether or not it declared a `Content-Length`.
#[axum::debug_handler]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadRes>, ApiError> {
    if declared_length(&headers).is_some_and(|len| len > state.max_upload_bytes) {
        return Err(ApiError::PayloadTooLarge(state.max_upload_bytes));
    }

    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("upload without multipart body: {}", e);
        ApiError::BadRequest("No file uploaded".into())
    })?;

    let limit = state.max_upload_bytes;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if exceeds_body_limit(&e) {
            return ApiError::PayloadTooLarge(limit);
        }
        tracing::debug!("malformed multipart body: {}", e);
        ApiError::BadRequest("Malformed upload".into())
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let raw_filename = field.file_name().unwrap_or_default().to_owned();
        let body = Box::pin(StreamReader::new(field.map_err(io::Error::other)));
        let stored = state
            .files
            .upload(&raw_filename, body)
            .await
            .map_err(|e| match e {
                FileShareError::BodyRead { ref source, .. } if body_error_exceeds_limit(source) => {
                    tracing::warn!("upload of {:?} exceeded {} bytes", raw_filename, limit);
                    ApiError::PayloadTooLarge(limit)
                }
                other => other.into(),
            })?;

        return Ok(Json(UploadRes {
            status: "uploaded".into(),
            filename: stored.filename,
            size: stored.size,
        }));
    }

    Err(ApiError::BadRequest("No file uploaded".into()))
}

#[utoipa::path(
    get,
    path = "/files",
    responses(
        (status = 200, description = "Stored files in upload order", body = [FileEntry])
    )
)]
/// List every stored file.
#[axum::debug_handler]
pub async fn list_files(State(state): State<AppState>) -> Json<Vec<FileEntry>> {
    Json(entries(state.files.list().await))
}

#[utoipa::path(
    get,
    path = "/download/{filename}",
    params(("filename" = String, Path, description = "URL-encoded filename")),
    responses(
        (status = 200, description = "File contents as an attachment"),
        (status = 400, description = "Filename does not decode"),
        (status = 404, description = "File not found in metadata or on disk")
    )
)]
/// Stream a stored file as an attachment.
#[axum::debug_handler]
pub async fn download_file(
    State(state): State<AppState>,
    params: RawPathParams,
) -> Result<Response, ApiError> {
    let download = state.files.download(filename_param(&params)?).await?;

    let content_type = mime_guess::from_path(&download.filename).first_or_octet_stream();
    let disposition = HeaderValue::from_str(&content_disposition(&download.filename))
        .map_err(|e| ApiError::Internal(format!("bad Content-Disposition: {e}")))?;
    let content_type = HeaderValue::from_str(content_type.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    let body = Body::from_stream(ReaderStream::new(download.file));

    Ok((headers, body).into_response())
}

#[utoipa::path(
    delete,
    path = "/delete/{filename}",
    params(("filename" = String, Path, description = "URL-encoded filename")),
    responses(
        (status = 200, description = "Remaining files", body = [FileEntry]),
        (status = 400, description = "Filename does not decode"),
        (status = 404, description = "File not found in metadata"),
        (status = 500, description = "Metadata could not be saved")
    )
)]
/// Delete a stored file and return what is left.
#[axum::debug_handler]
pub async fn delete_file(
    State(state): State<AppState>,
    params: RawPathParams,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    let remaining = state.files.delete(filename_param(&params)?).await?;
    Ok(Json(entries(remaining)))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987
/// `filename*` carrying the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    if fallback == filename {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}
