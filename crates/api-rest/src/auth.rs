//! PIN login and the session gate.
//!
//! A correct PIN earns an HS256-signed session token in the `session`
//! cookie. Every route outside [`is_public_path`] requires a valid, unexpired
//! token; anything else is redirected to the login page with the cookie
//! cleared. Login attempts are rate limited per client address.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::rejection::JsonRejection;
use axum::extract::{OriginalUri, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use utoipa::ToSchema;

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_PATH: &str = "/login";
pub const LOGOUT_PATH: &str = "/logout";

const SESSION_SUBJECT: &str = "fileshare";

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginReq {
    pub pin: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusRes {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// Signs and verifies session tokens.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.sub = Some(SESSION_SUBJECT.to_string());

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token valid for the configured TTL from now.
    pub fn issue(&self) -> jsonwebtoken::errors::Result<String> {
        self.issue_at(jsonwebtoken::get_current_timestamp())
    }

    fn issue_at(&self, issued_at: u64) -> jsonwebtoken::errors::Result<String> {
        let claims = SessionClaims {
            sub: SESSION_SUBJECT.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.ttl.as_secs()),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// True if `token` carries our signature, algorithm and an unexpired `exp`.
    pub fn verify(&self, token: &str) -> bool {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation).is_ok()
    }
}

struct AttemptWindow {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter on login attempts, keyed by client address.
///
/// Every attempt counts, successful or not.
pub struct LoginRateLimiter {
    max_attempts: u32,
    window: Duration,
    attempts: Mutex<HashMap<IpAddr, AttemptWindow>>,
}

impl LoginRateLimiter {
    /// `max_attempts == 0` disables limiting.
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt from `ip`.
    ///
    /// Returns `Err(retry_after_secs)` once the client has used up its window.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if self.max_attempts == 0 {
            return Ok(());
        }

        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        let entry = attempts.entry(ip).or_insert(AttemptWindow {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_attempts {
            let remaining = self
                .window
                .saturating_sub(now.duration_since(entry.started));
            return Err(remaining.as_secs().max(1));
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have expired.
    pub async fn prune(&self) {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        attempts.retain(|_, entry| now.duration_since(entry.started) < self.window);
    }
}

/// Everything the login gate needs at request time.
pub struct AuthState {
    pin: String,
    pub sessions: SessionKeys,
    pub limiter: LoginRateLimiter,
    cookie_secure: bool,
}

impl AuthState {
    pub fn new(cfg: &crate::config::AuthConfig) -> Self {
        Self {
            pin: cfg.pin.clone(),
            sessions: SessionKeys::new(&cfg.jwt_secret, cfg.session_ttl),
            limiter: LoginRateLimiter::new(cfg.login_rate_limit_max, cfg.login_rate_limit_window),
            cookie_secure: cfg.cookie_secure,
        }
    }

    fn session_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.sessions.ttl().as_secs()).unwrap_or(i64::MAX);
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Strict)
            .max_age(time::Duration::seconds(max_age))
            .build()
    }
}

/// Paths reachable without a session.
pub fn is_public_path(path: &str) -> bool {
    path == LOGIN_PATH
        || path == LOGOUT_PATH
        || path == "/health"
        || path == "/public"
        || path.starts_with("/public/")
}

fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build())
}

fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|value| value.parse::<IpAddr>().ok())
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = StatusRes),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Incorrect PIN"),
        (status = 429, description = "Too many login attempts")
    )
)]
/// Exchange the shared PIN for a session cookie.
///
/// # Errors
///
/// - `429` once the client exceeds its login attempts for the window
/// - `400` if the body is not `{"pin": "..."}`
/// - `401` if the PIN is wrong
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<LoginReq>, JsonRejection>,
) -> Result<(CookieJar, Json<StatusRes>), ApiError> {
    let ip = client_ip(&headers, connect_info.as_ref());
    if let Err(retry_after) = state.auth.limiter.check(ip).await {
        tracing::warn!(client_ip = %ip, "login rate limit exceeded");
        return Err(ApiError::RateLimited(retry_after));
    }

    let Json(req) = payload.map_err(|e| {
        tracing::debug!("bad login body: {}", e);
        ApiError::BadRequest("Invalid request".into())
    })?;

    if req.pin != state.auth.pin {
        tracing::warn!(client_ip = %ip, "failed login attempt");
        return Err(ApiError::Unauthorized("Incorrect PIN"));
    }

    let token = state
        .auth
        .sessions
        .issue()
        .map_err(|e| ApiError::Internal(format!("failed to generate token: {e}")))?;

    tracing::info!(client_ip = %ip, "login successful");
    Ok((
        jar.add(state.auth.session_cookie(token)),
        Json(StatusRes {
            status: "ok".into(),
        }),
    ))
}

/// Clear the session cookie and go back to the login page.
pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    tracing::info!("user logged out");
    (clear_session(jar), Redirect::to(LOGIN_PATH))
}

/// Middleware gating every non-public path on a valid session cookie.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    if is_public_path(&path) {
        return next.run(request).await;
    }

    let session_valid = jar
        .get(SESSION_COOKIE)
        .map(|cookie| state.auth.sessions.verify(cookie.value()));

    match session_valid {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::info!(path = %path, "invalid or expired session, redirecting to login");
            (clear_session(jar), Redirect::to(LOGIN_PATH)).into_response()
        }
        None => {
            tracing::debug!(path = %path, "no session cookie, redirecting to login");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}
