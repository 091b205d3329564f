//! Startup configuration for the relay.
//!
//! Configuration is read once, validated, and frozen into a [`RelayConfig`]
//! that is shared read-only by every request handler. Values come from the
//! process environment (optionally seeded from a `.env` file) and can be
//! overridden from the command line through [`ConfigOverrides`].
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |---|---|
//! | `RPCs` | primary pool, comma-separated base URLs |
//! | `FALLBACK_RPCs` | fallback pool, comma-separated base URLs |
//! | `PORT` | listen port |
//! | `ERROR_TIME_TO_LIVE_MINUTES` | how long a failing endpoint stays excluded |
//! | `SLACK_WEBHOOK_URL` | alert sink |
//! | `UPSTREAM_TIMEOUT_MS` | optional, outbound call timeout (default 30000) |
//! | `EXCLUSION_CAPACITY` | optional, exclusion cache budget (default 10) |

use std::time::Duration;

use crate::error::{RelayError, Result};

pub const ENV_PRIMARY: &str = "RPCs";
pub const ENV_FALLBACK: &str = "FALLBACK_RPCs";
pub const ENV_PORT: &str = "PORT";
pub const ENV_ERROR_TTL_MINUTES: &str = "ERROR_TIME_TO_LIVE_MINUTES";
pub const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const ENV_UPSTREAM_TIMEOUT_MS: &str = "UPSTREAM_TIMEOUT_MS";
pub const ENV_EXCLUSION_CAPACITY: &str = "EXCLUSION_CAPACITY";
pub const ENV_MODE: &str = "ENV";

/// Default timeout for a single upstream attempt.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

/// Default number of exclusion entries held before the cache starts evicting.
pub const DEFAULT_EXCLUSION_CAPACITY: usize = 10;

/// Longest accepted exclusion TTL (30 days).
pub const MAX_ERROR_TTL_MINUTES: u64 = 30 * 24 * 60;

/// Longest accepted upstream timeout (one hour).
pub const MAX_UPSTREAM_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Validates that a URL string starts with http:// or https://
pub fn validate_http_url(url: &str, description: &'static str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(RelayError::InvalidUrl {
            description,
            url: url.to_string(),
        })
    }
}

/// Loads a `.env` file into the process environment unless `ENV=production`.
///
/// A missing file is not an error; a malformed one is.
pub fn load_dotenv() -> Result<()> {
    if std::env::var(ENV_MODE).as_deref() == Ok("production") {
        return Ok(());
    }

    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => {
            tracing::debug!("No .env file found, using process environment");
            Ok(())
        }
        Err(e) => Err(RelayError::Config(format!("Error loading .env file: {}", e))),
    }
}

/// Values supplied on the command line. Each one, when set, wins over the
/// corresponding environment variable.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub primary: Vec<String>,
    pub fallback: Vec<String>,
    pub port: Option<u16>,
    pub error_ttl_minutes: Option<u64>,
    pub slack_webhook_url: Option<String>,
    pub upstream_timeout_ms: Option<u64>,
    pub exclusion_capacity: Option<usize>,
}

/// Immutable relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Primary pool, in configured order
    pub primary: Vec<String>,
    /// Fallback pool, used only once every primary endpoint is exhausted
    pub fallback: Vec<String>,
    /// Port the inbound listener binds on
    pub port: u16,
    /// How long a rate-limited or unreachable endpoint stays excluded
    pub exclusion_ttl: Duration,
    /// Slack-compatible webhook receiving escalation alerts
    pub slack_webhook_url: String,
    /// Upper bound on a single upstream attempt
    pub upstream_timeout: Duration,
    /// Exclusion cache admission budget
    pub exclusion_capacity: usize,
}

impl RelayConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from `overrides`, falling back to `lookup` for
    /// anything the overrides leave unset.
    ///
    /// # Arguments
    /// * `overrides` - Values taken from the command line
    /// * `lookup` - Reads one environment variable by name
    ///
    /// # Returns
    /// - `Ok(RelayConfig)` - Every required value was present and valid
    /// - `Err(RelayError::MissingEnv)` - A required variable is unset or blank
    /// - `Err(RelayError::Config)` - A value does not parse or is out of range
    /// - `Err(RelayError::InvalidUrl)` - An endpoint or the webhook lacks an http(s) prefix
    pub fn resolve<F>(overrides: ConfigOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let primary = if overrides.primary.is_empty() {
            parse_pool(ENV_PRIMARY, &required(&lookup, ENV_PRIMARY)?)?
        } else {
            overrides.primary
        };
        let fallback = if overrides.fallback.is_empty() {
            parse_pool(ENV_FALLBACK, &required(&lookup, ENV_FALLBACK)?)?
        } else {
            overrides.fallback
        };

        let port = match overrides.port {
            Some(port) => port,
            None => required(&lookup, ENV_PORT)?
                .trim()
                .parse::<u16>()
                .map_err(|e| RelayError::Config(format!("Invalid {}: {}", ENV_PORT, e)))?,
        };

        let ttl_minutes = match overrides.error_ttl_minutes {
            Some(minutes) => minutes,
            None => required(&lookup, ENV_ERROR_TTL_MINUTES)?
                .trim()
                .parse::<u64>()
                .map_err(|e| {
                    RelayError::Config(format!(
                        "Invalid duration for {}: {}",
                        ENV_ERROR_TTL_MINUTES, e
                    ))
                })?,
        };
        if ttl_minutes == 0 {
            return Err(RelayError::Config(format!(
                "{} must be greater than zero",
                ENV_ERROR_TTL_MINUTES
            )));
        }
        if ttl_minutes > MAX_ERROR_TTL_MINUTES {
            return Err(RelayError::Config(format!(
                "{} must be at most {}",
                ENV_ERROR_TTL_MINUTES, MAX_ERROR_TTL_MINUTES
            )));
        }
        let exclusion_ttl = Duration::from_secs(ttl_minutes * 60);

        let slack_webhook_url = match overrides.slack_webhook_url {
            Some(url) => url,
            None => required(&lookup, ENV_SLACK_WEBHOOK_URL)?,
        };

        let upstream_timeout_ms = match overrides.upstream_timeout_ms {
            Some(ms) => ms,
            None => optional_number(&lookup, ENV_UPSTREAM_TIMEOUT_MS)?
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_MS),
        };
        let exclusion_capacity = match overrides.exclusion_capacity {
            Some(capacity) => capacity,
            None => optional_number(&lookup, ENV_EXCLUSION_CAPACITY)?
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_EXCLUSION_CAPACITY),
        };

        let config = Self {
            primary,
            fallback,
            port,
            exclusion_ttl,
            slack_webhook_url,
            upstream_timeout: Duration::from_millis(upstream_timeout_ms),
            exclusion_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a hand-built configuration must also satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.primary.is_empty() {
            return Err(RelayError::Config("No RPCs provided".to_string()));
        }
        if self.fallback.is_empty() {
            return Err(RelayError::Config("No fallback RPC provided".to_string()));
        }
        for url in &self.primary {
            validate_http_url(url, "primary RPC")?;
        }
        for url in &self.fallback {
            validate_http_url(url, "fallback RPC")?;
        }
        validate_http_url(&self.slack_webhook_url, "Slack webhook URL")?;
        if self.exclusion_ttl.is_zero() {
            return Err(RelayError::Config("Exclusion TTL must be greater than zero".to_string()));
        }
        if self.exclusion_ttl > Duration::from_secs(MAX_ERROR_TTL_MINUTES * 60) {
            return Err(RelayError::Config(format!(
                "Exclusion TTL must be at most {} minutes",
                MAX_ERROR_TTL_MINUTES
            )));
        }
        if self.upstream_timeout.is_zero() {
            return Err(RelayError::Config("Upstream timeout must be greater than zero".to_string()));
        }
        if self.upstream_timeout > Duration::from_millis(MAX_UPSTREAM_TIMEOUT_MS) {
            return Err(RelayError::Config(format!(
                "{} must be at most {}",
                ENV_UPSTREAM_TIMEOUT_MS, MAX_UPSTREAM_TIMEOUT_MS
            )));
        }
        if self.exclusion_capacity == 0 {
            return Err(RelayError::Config("Exclusion capacity must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RelayError::MissingEnv(key)),
    }
}

fn optional_number<F>(lookup: &F, key: &'static str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            let n = value
                .trim()
                .parse::<u64>()
                .map_err(|e| RelayError::Config(format!("Invalid {}: {}", key, e)))?;
            Ok(Some(n))
        }
        _ => Ok(None),
    }
}

/// Splits a comma-separated endpoint list. Order and duplicates are kept.
pub fn parse_pool(key: &str, raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() {
                Err(RelayError::Config(format!("{} contains an empty endpoint", key)))
            } else {
                Ok(item.to_string())
            }
        })
        .collect()
}
