//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed or non-positive values.
//! The database URL is wrapped in secrecy::SecretString since it may
//! carry credentials.

use std::time::Duration;

use crate::error::{Error, Result};
use secrecy::SecretString;

const DEFAULT_DATABASE_URL: &str = "sqlite:ticketq.db";
const DEFAULT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_GLOBAL_RATE_LIMIT: u32 = 100;
const DEFAULT_PER_USER_RATE_LIMIT: u32 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_JOB_DURATION_MS: u64 = 2000;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub rate_limit: RateLimitConfig,
    pub poll_interval: Duration,
    /// How long the simulated executor takes per job.
    pub job_duration: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Fixed-window limits. All three must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub global_limit: u32,
    pub per_user_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_WINDOW_SECONDS),
            global_limit: DEFAULT_GLOBAL_RATE_LIMIT,
            per_user_limit: DEFAULT_PER_USER_RATE_LIMIT,
        }
    }
}

impl RateLimitConfig {
    pub fn new(window_seconds: u64, global_limit: u32, per_user_limit: u32) -> Result<Self> {
        let config = Self {
            window: Duration::from_secs(window_seconds),
            global_limit,
            per_user_limit,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(Error::Config("WINDOW_SECONDS must be positive".to_string()));
        }
        if self.global_limit == 0 {
            return Err(Error::Config("GLOBAL_RATE_LIMIT must be positive".to_string()));
        }
        if self.per_user_limit == 0 {
            return Err(Error::Config(
                "PER_USER_RATE_LIMIT must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// Unset variables fall back to defaults; set-but-invalid ones are errors.
    pub fn from_env() -> Result<Self> {
        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(positive_var("WINDOW_SECONDS", DEFAULT_WINDOW_SECONDS)?),
            global_limit: positive_var("GLOBAL_RATE_LIMIT", DEFAULT_GLOBAL_RATE_LIMIT)?,
            per_user_limit: positive_var("PER_USER_RATE_LIMIT", DEFAULT_PER_USER_RATE_LIMIT)?,
        };
        rate_limit.validate()?;

        Ok(Self {
            database_url: SecretString::from(
                std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            ),
            rate_limit,
            poll_interval: Duration::from_millis(positive_var(
                "POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            job_duration: Duration::from_millis(positive_var(
                "JOB_DURATION_MS",
                DEFAULT_JOB_DURATION_MS,
            )?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Read a positive integer, or `default` when the variable is unset.
///
/// Parsing goes through i64 first so that `-5` reports "must be positive"
/// rather than a bare parse failure.
fn positive_var<T>(name: &str, default: T) -> Result<T>
where
    T: TryFrom<i64>,
{
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be an integer, got {raw:?}")))?;
    if value <= 0 {
        return Err(Error::Config(format!("{name} must be positive, got {value}")));
    }
    T::try_from(value).map_err(|_| Error::Config(format!("{name} is out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_limits() {
        assert!(RateLimitConfig::new(0, 5, 2).is_err());
        assert!(RateLimitConfig::new(60, 0, 2).is_err());
        assert!(RateLimitConfig::new(60, 5, 0).is_err());
        assert!(RateLimitConfig::new(60, 5, 2).is_ok());
    }
}
