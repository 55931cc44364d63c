//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable numeric values
//! fall back to their defaults; only a malformed `LISTEN_ADDR` is fatal.

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::token::{DEFAULT_TOKEN_EXPIRY_DAYS, MAX_TOKEN_EXPIRY_DAYS};
use crate::service::emergency_service::DEFAULT_NOTIFIER_TIMEOUT;
use crate::service::proximity::{DEFAULT_NEARBY_RADIUS_KM, DEFAULT_RECENCY_WINDOW_SECS};

/// Secret used when `JWT_SECRET` is unset. Never use it outside development.
pub const DEV_JWT_SECRET: &str = "safeguard-dev-secret-change-me";

/// Upper bound for the recency window and index retention, in seconds.
pub const MAX_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

const DEFAULT_LOCATION_RETENTION_SECS: i64 = 3600;

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is set but is not a socket address.
    #[error("invalid LISTEN_ADDR {value:?}: {source}")]
    InvalidListenAddr {
        /// The offending value.
        value: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`SafeguardConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SafeguardConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Master switch for PostgreSQL.
    pub persistence_enabled: bool,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// HS256 secret for bearer tokens.
    pub jwt_secret: String,

    /// Lifetime of issued tokens, in days.
    pub token_expiry_days: i64,

    /// Emergency and location fan-out radius.
    pub nearby_radius_km: f64,

    /// Proximity recency window, in seconds.
    pub recency_window_secs: i64,

    /// Per-contact SMS deadline.
    pub notifier_timeout: Duration,

    /// SMS gateway endpoint. `None` selects the log-only notifier.
    pub notifier_webhook_url: Option<String>,

    /// Outbound queue size of each WebSocket connection.
    pub connection_buffer: usize,

    /// How long pings stay in the in-memory index, in seconds. Never
    /// shorter than `recency_window_secs`.
    pub location_retention_secs: i64,

    /// Seconds between index prune passes.
    pub location_prune_interval_secs: u64,

    /// HTTP request timeout, in seconds.
    pub request_timeout_secs: u64,

    /// Log output format.
    pub log_format: LogFormat,
}

impl SafeguardConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListenAddr`] if `LISTEN_ADDR` is set
    /// but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`SafeguardConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let raw_addr = env
            .string("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let listen_addr = raw_addr
            .parse()
            .map_err(|source| ConfigError::InvalidListenAddr {
                value: raw_addr.clone(),
                source,
            })?;

        let log_format = match env.string("LOG_FORMAT").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let default_timeout_ms = u64::try_from(DEFAULT_NOTIFIER_TIMEOUT.as_millis()).unwrap_or(5000);
        let window_secs = |key: &str, default: i64| {
            env.parse_where(key, default, |s: &i64| (1..=MAX_WINDOW_SECS).contains(s))
        };
        let recency_window_secs = window_secs("RECENCY_WINDOW_SECS", DEFAULT_RECENCY_WINDOW_SECS);
        let location_retention_secs =
            window_secs("LOCATION_RETENTION_SECS", DEFAULT_LOCATION_RETENTION_SECS)
                .max(recency_window_secs);

        Ok(Self {
            listen_addr,
            database_url: env.string("DATABASE_URL"),
            persistence_enabled: env.flag("PERSISTENCE_ENABLED", true),
            database_max_connections: env.parse("DATABASE_MAX_CONNECTIONS", 10),
            database_min_connections: env.parse("DATABASE_MIN_CONNECTIONS", 2),
            database_connect_timeout_secs: env.parse("DATABASE_CONNECT_TIMEOUT_SECS", 5),
            jwt_secret: env
                .string("JWT_SECRET")
                .unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            token_expiry_days: env
                .parse_where("TOKEN_EXPIRY_DAYS", DEFAULT_TOKEN_EXPIRY_DAYS, |d: &i64| {
                    (1..=MAX_TOKEN_EXPIRY_DAYS).contains(d)
                }),
            nearby_radius_km: env
                .parse_where("NEARBY_RADIUS_KM", DEFAULT_NEARBY_RADIUS_KM, |r: &f64| {
                    r.is_finite() && *r > 0.0
                }),
            recency_window_secs,
            notifier_timeout: Duration::from_millis(
                env.parse("NOTIFIER_TIMEOUT_MS", default_timeout_ms).max(1),
            ),
            notifier_webhook_url: env.string("NOTIFIER_WEBHOOK_URL"),
            connection_buffer: env.parse::<usize>("CONNECTION_BUFFER", 256).max(1),
            location_retention_secs,
            location_prune_interval_secs: env.parse::<u64>("LOCATION_PRUNE_INTERVAL_SECS", 60).max(1),
            request_timeout_secs: env.parse::<u64>("REQUEST_TIMEOUT_SECS", 30).max(1),
            log_format,
        })
    }

    /// The database URL to connect to, if persistence is on and configured.
    #[must_use]
    pub fn postgres_url(&self) -> Option<&str> {
        if self.persistence_enabled {
            self.database_url.as_deref()
        } else {
            None
        }
    }

    /// The proximity recency window.
    #[must_use]
    pub fn recency_window(&self) -> chrono::Duration {
        seconds_or(self.recency_window_secs, DEFAULT_RECENCY_WINDOW_SECS)
    }

    /// How long pings stay in the in-memory index.
    #[must_use]
    pub fn location_retention(&self) -> chrono::Duration {
        seconds_or(self.location_retention_secs, DEFAULT_LOCATION_RETENTION_SECS)
    }

    /// `true` if the development token secret is in use.
    #[must_use]
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn seconds_or(secs: i64, default: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs)
        .or_else(|| chrono::Duration::try_seconds(default))
        .unwrap_or_else(chrono::Duration::zero)
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Non-blank trimmed value of `key`.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn parse_where<T, P>(&self, key: &str, default: T, valid: P) -> T
    where
        T: std::str::FromStr,
        P: Fn(&T) -> bool,
    {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .filter(|v| valid(v))
            .unwrap_or(default)
    }

    /// Accepts `"true"`, `"1"`, `"false"`, `"0"` (case-insensitive).
    fn flag(&self, key: &str, default: bool) -> bool {
        match self.string(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            _ => default,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<SafeguardConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SafeguardConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let Ok(config) = load(&[]) else {
            panic!("empty environment must load");
        };
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.database_url.is_none());
        assert!(config.postgres_url().is_none());
        assert!(config.uses_dev_secret());
        assert!((config.nearby_radius_km - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.recency_window_secs, 300);
        assert_eq!(config.notifier_timeout, Duration::from_secs(5));
        assert_eq!(config.connection_buffer, 256);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn values_are_read() {
        let Ok(config) = load(&[
            ("LISTEN_ADDR", "127.0.0.1:8080"),
            ("DATABASE_URL", "postgres://localhost/safeguard"),
            ("JWT_SECRET", "s3cret"),
            ("NEARBY_RADIUS_KM", "1.5"),
            ("NOTIFIER_TIMEOUT_MS", "250"),
            ("LOG_FORMAT", "JSON"),
        ]) else {
            panic!("valid environment must load");
        };
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(
            config.postgres_url(),
            Some("postgres://localhost/safeguard")
        );
        assert!(!config.uses_dev_secret());
        assert!((config.nearby_radius_km - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.notifier_timeout, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let Ok(config) = load(&[
            ("NEARBY_RADIUS_KM", "-2"),
            ("CONNECTION_BUFFER", "lots"),
            ("RECENCY_WINDOW_SECS", "0"),
        ]) else {
            panic!("invalid numbers must not fail startup");
        };
        assert!((config.nearby_radius_km - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.connection_buffer, 256);
        assert_eq!(config.recency_window_secs, DEFAULT_RECENCY_WINDOW_SECS);
    }

    #[test]
    fn out_of_range_durations_fall_back() {
        let Ok(config) = load(&[
            ("RECENCY_WINDOW_SECS", "9223372036854775807"),
            ("LOCATION_RETENTION_SECS", "-5"),
            ("TOKEN_EXPIRY_DAYS", "9223372036854775807"),
        ]) else {
            panic!("out-of-range values must not fail startup");
        };
        assert_eq!(config.recency_window_secs, DEFAULT_RECENCY_WINDOW_SECS);
        assert_eq!(config.location_retention_secs, DEFAULT_LOCATION_RETENTION_SECS);
        assert_eq!(config.token_expiry_days, DEFAULT_TOKEN_EXPIRY_DAYS);
        assert_eq!(
            config.recency_window(),
            chrono::Duration::seconds(DEFAULT_RECENCY_WINDOW_SECS)
        );
    }

    #[test]
    fn retention_never_undercuts_recency_window() {
        let Ok(config) = load(&[
            ("RECENCY_WINDOW_SECS", "300"),
            ("LOCATION_RETENTION_SECS", "60"),
        ]) else {
            panic!("valid environment must load");
        };
        assert_eq!(config.location_retention_secs, 300);
        assert!(config.location_retention() >= config.recency_window());
    }

    #[test]
    fn persistence_switch_disables_postgres() {
        let Ok(config) = load(&[
            ("DATABASE_URL", "postgres://localhost/safeguard"),
            ("PERSISTENCE_ENABLED", "false"),
        ]) else {
            panic!("valid environment must load");
        };
        assert!(config.postgres_url().is_none());
    }

    #[test]
    fn bad_listen_addr_is_fatal() {
        assert!(matches!(
            load(&[("LISTEN_ADDR", "not an address")]),
            Err(ConfigError::InvalidListenAddr { .. })
        ));
    }
}
