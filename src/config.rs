//! Configuration types.
//!
//! Everything is read from the environment once at process start and is
//! immutable afterwards.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default store address when `QDB_ADDR` is unset.
pub const DEFAULT_STORE_ADDR: &str = "redis:6379";

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Entity store address.
    pub store_addr: String,
    /// Cadence of the cooperative scheduler tick.
    pub tick_interval: Duration,
    pub clock: ClockConfig,
    /// Mail dispatch settings. `None` disables the SMTP worker.
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_addr = std::env::var("QDB_ADDR")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STORE_ADDR.to_string());

        Ok(Self {
            store_addr,
            tick_interval: env_nonzero_millis("SCHEDULER_TICK_MS", 100)?,
            clock: ClockConfig::from_env()?,
            smtp: SmtpConfig::from_env()?,
        })
    }
}

/// Clock worker configuration.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Minimum time between two timestamp sweeps.
    pub update_interval: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(1),
        }
    }
}

impl ClockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            update_interval: Duration::from_millis(env_parse("CLOCK_UPDATE_INTERVAL_MS", 1000)?),
        })
    }
}

/// Outbound SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Sender address, also used as the SMTP username.
    pub email_address: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (worker disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(host) = std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let email_address = std::env::var("SMTP_EMAIL_ADDRESS")
            .map_err(|_| ConfigError::MissingEnvVar("SMTP_EMAIL_ADDRESS".to_string()))?;
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();

        Ok(Some(Self {
            email_address,
            password: SecretString::from(password),
            host,
            port: env_parse("SMTP_PORT", 587)?,
        }))
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{raw:?}: {e}"),
                })
        }
        _ => Ok(default),
    }
}

/// Parse a millisecond duration that must be positive.
fn env_nonzero_millis(key: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match env_parse(key, default_ms)? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        ms => Ok(Duration::from_millis(ms)),
    }
}
