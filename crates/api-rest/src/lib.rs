//! # API REST
//!
//! HTTP front end for the file-sharing server.
//!
//! Handles:
//! - PIN login, session cookies and the auth gate
//! - File endpoints with axum
//! - Static login and browser pages
//! - OpenAPI/Swagger documentation
//!
//! Storage semantics live in `fileshare-core`.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, get_service, post};
use axum::{middleware, Router};
use fileshare_core::FileService;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use auth::{AuthState, LoginRateLimiter, SessionKeys};
pub use config::{AuthConfig, ServerConfig};
pub use error::ApiError;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileService>,
    pub auth: Arc<AuthState>,
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(files: Arc<FileService>, cfg: &ServerConfig) -> Self {
        Self {
            files,
            auth: Arc::new(AuthState::new(&cfg.auth)),
            max_upload_bytes: cfg.max_upload_bytes,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        files::upload_file,
        files::list_files,
        files::download_file,
        files::delete_file,
    ),
    components(schemas(
        health::HealthRes,
        auth::LoginReq,
        auth::StatusRes,
        files::FileEntry,
        files::UploadRes,
    ))
)]
pub struct ApiDoc;

/// Build the full application router.
///
/// `public_dir` holds `login.html`, the browser page served at `/` and any
/// assets under `/public`.
pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    let upload_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);
    let login_page = ServeFile::new(public_dir.join("login.html"));

    Router::new()
        .route("/health", get(health::health))
        .route(auth::LOGIN_PATH, get_service(login_page).post(auth::login))
        .route(auth::LOGOUT_PATH, get(auth::logout))
        .route(
            "/upload",
            post(files::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files", get(files::list_files))
        .route("/download/:filename", get(files::download_file))
        .route("/delete/:filename", delete(files::delete_file))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/public", ServeDir::new(public_dir))
        .fallback_service(ServeDir::new(public_dir))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
