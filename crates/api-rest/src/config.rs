//! Server configuration.
//!
//! Read once at startup. `from_lookup` takes the variable source as a closure
//! so tests do not have to touch the process environment.

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3002";
pub const DEFAULT_PUBLIC_DIR: &str = "./public";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_LOGIN_RATE_LIMIT_MAX: u32 = 5;
pub const DEFAULT_LOGIN_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: String,
    pub public_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub auth: AuthConfig,
}

/// Settings for the login gate.
#[derive(Clone)]
pub struct AuthConfig {
    pub pin: String,
    pub jwt_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
    /// Login attempts allowed per client per window. `0` disables the limit.
    pub login_rate_limit_max: u32,
    pub login_rate_limit_window: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("pin", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("cookie_secure", &self.cookie_secure)
            .field("login_rate_limit_max", &self.login_rate_limit_max)
            .field("login_rate_limit_window", &self.login_rate_limit_window)
            .finish()
    }
}

impl ServerConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `LOGIN_PIN` or `JWT_SECRET_KEY` is missing or empty,
    /// or a numeric/boolean variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let Some(pin) = get("LOGIN_PIN") else {
            bail!("LOGIN_PIN is not set in the environment");
        };
        let Some(jwt_secret) = get("JWT_SECRET_KEY") else {
            bail!("JWT_SECRET_KEY is not set in the environment");
        };

        let session_ttl_secs = parse_or(
            "SESSION_TTL_SECS",
            get("SESSION_TTL_SECS"),
            DEFAULT_SESSION_TTL_SECS,
        )?;
        let window_secs = parse_or(
            "LOGIN_RATE_LIMIT_WINDOW_SECS",
            get("LOGIN_RATE_LIMIT_WINDOW_SECS"),
            DEFAULT_LOGIN_RATE_LIMIT_WINDOW_SECS,
        )?;

        Ok(Self {
            addr: get("FILESHARE_ADDR").unwrap_or_else(|| DEFAULT_ADDR.into()),
            public_dir: get("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_DIR)),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            auth: AuthConfig {
                pin,
                jwt_secret: jwt_secret.into_bytes(),
                session_ttl: Duration::from_secs(session_ttl_secs),
                cookie_secure: parse_or("COOKIE_SECURE", get("COOKIE_SECURE"), true)?,
                login_rate_limit_max: parse_or(
                    "LOGIN_RATE_LIMIT_MAX",
                    get("LOGIN_RATE_LIMIT_MAX"),
                    DEFAULT_LOGIN_RATE_LIMIT_MAX,
                )?,
                login_rate_limit_window: Duration::from_secs(window_secs),
            },
        })
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .parse()
            .with_context(|| format!("{key} has an invalid value: {v:?}")),
        None => Ok(default),
    }
}
