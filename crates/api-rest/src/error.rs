//! HTTP error mapping.
//!
//! Every core error is categorised here; handlers never build status codes by
//! hand. Failures are JSON `{"error": "..."}` bodies. Auth failures are not
//! errors at all, they redirect (see [`crate::auth`]).

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fileshare_core::FileShareError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Core(FileShareError),
    BadRequest(String),
    Unauthorized(&'static str),
    /// Too many login attempts; seconds until the window resets.
    RateLimited(u64),
    /// Declared body length over the upload cap.
    PayloadTooLarge(u64),
    Internal(String),
}

impl From<FileShareError> for ApiError {
    fn from(e: FileShareError) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Core(e) => core_error_response(e),
            ApiError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => error_body(StatusCode::UNAUTHORIZED, message),
            ApiError::RateLimited(retry_after) => {
                let mut response = error_body(
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many login attempts, try again later",
                );
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            ApiError::PayloadTooLarge(limit) => error_body(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Upload exceeds the {limit} byte limit"),
            ),
            ApiError::Internal(message) => {
                tracing::error!("internal error: {}", message);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}

fn core_error_response(e: FileShareError) -> Response {
    match e {
        FileShareError::InvalidName(_) => error_body(StatusCode::BAD_REQUEST, "Invalid filename"),
        FileShareError::NotFound(kind) => error_body(StatusCode::NOT_FOUND, kind.to_string()),
        FileShareError::MetadataPersist {
            stored: Some(stored),
            source,
        } => {
            tracing::error!(
                "metadata not saved for stored file {}: {}",
                stored.filename,
                source
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "File stored but failed to save metadata",
                    "filename": stored.filename,
                    "size": stored.size,
                })),
            )
                .into_response()
        }
        FileShareError::MetadataPersist { stored: None, source } => {
            tracing::error!("metadata not saved: {}", source);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update metadata")
        }
        FileShareError::BodyRead { filename, source } => {
            tracing::info!("upload of {} interrupted: {}", filename, source);
            error_body(StatusCode::BAD_REQUEST, "Upload interrupted")
        }
        write_err @ FileShareError::DiskWrite { .. } => {
            tracing::error!("upload error: {:?}", write_err);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
        }
        other => {
            tracing::error!("file operation error: {:?}", other);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileshare_core::{FileSummary, IndexError, NotFoundKind};

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (
                ApiError::from(FileShareError::InvalidName("..".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(FileShareError::NotFound(NotFoundKind::Metadata)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(FileShareError::NotFound(NotFoundKind::Disk)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(FileShareError::BodyRead {
                    filename: "a".into(),
                    source: std::io::Error::other("connection reset"),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(FileShareError::DiskWrite {
                    filename: "a".into(),
                    source: std::io::Error::other("disk full"),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(FileShareError::MetadataPersist {
                    stored: Some(FileSummary {
                        filename: "a".into(),
                        size: 1,
                    }),
                    source: IndexError::Write {
                        path: "i.json".into(),
                        source: std::io::Error::other("read-only"),
                    },
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
