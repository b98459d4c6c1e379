//! Broker configuration.
//!
//! All options arrive as one [`Settings`] struct assembled from environment
//! lookups at startup; handlers never consult the environment directly.
//! Validation is fail-fast: a missing or weak master secret refuses start.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Minimum master-secret length in bytes.
pub const MIN_MASTER_SECRET_BYTES: usize = 32;

const DEFAULT_JWT_EXPIRE_MINUTES: i64 = 15;
const DEFAULT_RATE_LIMIT_RPM: u32 = 60;
const DEFAULT_RATE_LIMIT_RPH: u32 = 1_000;
const DEFAULT_MAX_CONCURRENT: usize = 20;
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 180;
const DEFAULT_INTERACTION_CAP: usize = 5_000;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.openai.com";

/// Failures raised while assembling [`Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("required environment variable {key} is not set")]
    MissingVar {
        /// The variable name.
        key: &'static str,
    },

    /// The master secret does not meet the entropy floor.
    #[error(
        "MASTER_JWT_SECRET must be at least {MIN_MASTER_SECRET_BYTES} bytes, got {actual}"
    )]
    WeakSecret {
        /// Observed length in bytes.
        actual: usize,
    },

    /// A variable is present but unparseable.
    #[error("environment variable {key} is invalid: {message}")]
    InvalidValue {
        /// The variable name.
        key: &'static str,
        /// What went wrong.
        message: String,
    },
}

/// Deployment environment, selected by `ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Hardened behavior: no CORS, terse logs.
    Production,
    /// Development-like behavior: permissive CORS, verbose logs.
    Development,
}

impl Environment {
    /// `true` in production.
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Lowercase label used in logs and `/system/info`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

/// Complete broker configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Master secret all per-project secrets derive from. Never logged.
    pub master_secret: String,
    /// Upstream provider credential, opaque to the broker.
    pub provider_api_key: String,
    /// Base URL of the OpenAI-compatible provider endpoint.
    pub provider_base_url: String,
    /// Deployment environment.
    pub environment: Environment,
    /// Token lifetime in minutes.
    pub jwt_expire_minutes: i64,
    /// Per-IP requests per minute.
    pub rate_limit_rpm: u32,
    /// Per-IP requests per hour.
    pub rate_limit_rph: u32,
    /// Concurrent in-flight request cap.
    pub max_concurrent: usize,
    /// Deadline for a single provider call.
    pub provider_timeout: Duration,
    /// Root of the JSON persistence layout.
    pub data_dir: PathBuf,
    /// Bound on the interaction stream.
    pub interaction_cap: usize,
    /// Host headers accepted by the trusted-host filter.
    pub trusted_hosts: Vec<String>,
    /// Listen address.
    pub bind_addr: SocketAddr,
}

impl Settings {
    /// Assemble settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing, the
    /// master secret is too short, or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let master_secret = require("MASTER_JWT_SECRET")?;
        if master_secret.len() < MIN_MASTER_SECRET_BYTES {
            return Err(ConfigError::WeakSecret {
                actual: master_secret.len(),
            });
        }
        let provider_api_key = require("PROVIDER_API_KEY")?;

        let environment = match std::env::var("ENV").ok().as_deref() {
            Some("production" | "prod") => Environment::Production,
            _ => Environment::Development,
        };

        Ok(Self {
            master_secret,
            provider_api_key,
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_BASE_URL.to_string()),
            environment,
            jwt_expire_minutes: parse_or("JWT_EXPIRE_MINUTES", DEFAULT_JWT_EXPIRE_MINUTES)?,
            rate_limit_rpm: parse_or("RATE_LIMIT_RPM", DEFAULT_RATE_LIMIT_RPM)?,
            rate_limit_rph: parse_or("RATE_LIMIT_RPH", DEFAULT_RATE_LIMIT_RPH)?,
            max_concurrent: parse_or("MAX_CONCURRENT", DEFAULT_MAX_CONCURRENT)?,
            provider_timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECONDS",
                DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            )?),
            data_dir: PathBuf::from(
                std::env::var("BRADAX_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            interaction_cap: parse_or("INTERACTION_CAP", DEFAULT_INTERACTION_CAP)?,
            trusted_hosts: std::env::var("TRUSTED_HOSTS")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["localhost".to_string(), "127.0.0.1".to_string()]),
            bind_addr: parse_or("BIND_ADDR", DEFAULT_BIND_ADDR.parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "BIND_ADDR",
                    message: "default bind address failed to parse".into(),
                }
            })?)?,
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar { key }),
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Env-var manipulation is process-global, so the cases run in one test.
    #[test]
    fn settings_from_env_validates() {
        unsafe {
            std::env::remove_var("MASTER_JWT_SECRET");
            std::env::remove_var("PROVIDER_API_KEY");
        }
        assert!(matches!(
            Settings::from_env(),
            Err(ConfigError::MissingVar {
                key: "MASTER_JWT_SECRET"
            })
        ));

        unsafe {
            std::env::set_var("MASTER_JWT_SECRET", "too-short");
        }
        assert!(matches!(
            Settings::from_env(),
            Err(ConfigError::WeakSecret { actual: 9 })
        ));

        unsafe {
            std::env::set_var(
                "MASTER_JWT_SECRET",
                "0123456789abcdef0123456789abcdef-entropy",
            );
            std::env::set_var("PROVIDER_API_KEY", "sk-test");
            std::env::set_var("ENV", "production");
            std::env::set_var("JWT_EXPIRE_MINUTES", "30");
        }
        let settings = Settings::from_env().unwrap();
        assert!(settings.environment.is_production());
        assert_eq!(settings.jwt_expire_minutes, 30);
        assert_eq!(settings.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(
            settings.provider_timeout,
            Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECONDS)
        );

        unsafe {
            std::env::set_var("RATE_LIMIT_RPM", "not-a-number");
        }
        assert!(matches!(
            Settings::from_env(),
            Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_RPM",
                ..
            })
        ));
        unsafe {
            std::env::remove_var("RATE_LIMIT_RPM");
            std::env::remove_var("ENV");
            std::env::remove_var("JWT_EXPIRE_MINUTES");
        }
    }
}
