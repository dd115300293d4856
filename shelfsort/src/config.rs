//! Server configuration from environment variables.
//!
//! | Variable                  | Default                         |
//! |---------------------------|---------------------------------|
//! | `HOST`                    | `0.0.0.0`                       |
//! | `PORT`                    | `4200`                          |
//! | `UPLOAD_DIR`              | `./uploads`                     |
//! | `PREDICTION_SERVICE_URL`  | `http://localhost:8000`         |
//! | `PREDICTION_TIMEOUT_SECS` | `30`                            |
//! | `PREDICTION_CONCURRENCY`  | `1`                             |
//! | `AWAIT_EXPLICIT_SHUTDOWN` | unset (`true` or `1` to enable) |
//!
//! `PREDICTION_SERVICE_URL` is the service's base URL; requests go to `<base>/predict`.

use std::path::PathBuf;
use std::time::Duration;

use crate::oracle::HttpOracleConfig;
use crate::transport::ServerConfig;

pub const DEFAULT_PREDICTION_BASE_URL: &str = "http://localhost:8000";
pub const PREDICT_PATH: &str = "/predict";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload_dir: PathBuf,
    /// Full prediction endpoint, including the `/predict` path.
    pub prediction_url: String,
    pub prediction_timeout: Duration,
    pub prediction_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upload_dir: PathBuf::from("./uploads"),
            prediction_url: prediction_endpoint(DEFAULT_PREDICTION_BASE_URL),
            prediction_timeout: Duration::from_secs(30),
            prediction_concurrency: 1,
        }
    }
}

/// `<base>/predict`, tolerating a trailing slash on the base.
pub fn prediction_endpoint(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), PREDICT_PATH)
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
            config.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.server.port = parse("PORT", &port)?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR").filter(|d| !d.is_empty()) {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(base) = lookup("PREDICTION_SERVICE_URL").filter(|u| !u.is_empty()) {
            config.prediction_url = prediction_endpoint(&base);
        }
        if let Some(secs) = lookup("PREDICTION_TIMEOUT_SECS") {
            config.prediction_timeout = Duration::from_secs(parse("PREDICTION_TIMEOUT_SECS", &secs)?);
        }
        if let Some(n) = lookup("PREDICTION_CONCURRENCY") {
            let n: usize = parse("PREDICTION_CONCURRENCY", &n)?;
            if n == 0 {
                return Err(ConfigError::Invalid {
                    name: "PREDICTION_CONCURRENCY",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.prediction_concurrency = n;
        }
        if let Some(flag) = lookup("AWAIT_EXPLICIT_SHUTDOWN") {
            config.server.await_explicit_shutdown = matches!(flag.trim(), "true" | "1");
        }

        Ok(config)
    }

    pub fn oracle(&self) -> HttpOracleConfig {
        HttpOracleConfig {
            url: self.prediction_url.clone(),
            timeout: self.prediction_timeout,
        }
    }
}
