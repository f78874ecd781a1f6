//! API Configuration Module
//!
//! Server settings loaded from environment variables. Every variable has a
//! development default; a value that is present but unparseable is a
//! startup error rather than being silently replaced by the default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use testbed_core::ConfigError;

pub const BIND_VAR: &str = "TESTBED_API_BIND";
pub const PORT_VAR: &str = "TESTBED_API_PORT";
pub const REQUEST_TIMEOUT_VAR: &str = "TESTBED_REQUEST_TIMEOUT_MS";
pub const CACHE_TTL_VAR: &str = "TESTBED_CACHE_TTL_SECS";
pub const RESULTS_DIR_VAR: &str = "TESTBED_RESULTS_DIR";
pub const STORE_VAR: &str = "TESTBED_STORE";
pub const CORS_ORIGINS_VAR: &str = "TESTBED_CORS_ORIGINS";

/// Longest accepted cache TTL (one week).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which `DataStore` the binary runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// PostgreSQL through the deadpool connection pool.
    #[default]
    Postgres,
    /// Seeded in-memory store; no database required.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mock" => Ok(StoreBackend::Memory),
            _ => Err(invalid(STORE_VAR, s, "expected postgres or memory")),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub host: String,

    pub port: u16,

    /// Upper bound on handling a single request, store and cache included.
    pub request_timeout: Duration,

    /// Time-to-live of cached lookup results.
    pub cache_ttl: Duration,

    /// Root directory for metric exports; files land in `{results_dir}/{mode}/`.
    pub results_dir: PathBuf,

    pub store: StoreBackend,

    /// Allowed CORS origins. Empty means allow all.
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout: Duration::from_millis(5_000),
            cache_ttl: Duration::from_secs(60),
            results_dir: PathBuf::from("results"),
            store: StoreBackend::default(),
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TESTBED_API_BIND`: interface (default: 0.0.0.0)
    /// - `PORT` or `TESTBED_API_PORT`: port (default: 3000)
    /// - `TESTBED_REQUEST_TIMEOUT_MS`: per-request deadline (default: 5000)
    /// - `TESTBED_CACHE_TTL_SECS`: cached lookup TTL, at most one week (default: 60)
    /// - `TESTBED_RESULTS_DIR`: export root (default: results)
    /// - `TESTBED_STORE`: postgres or memory (default: postgres)
    /// - `TESTBED_CORS_ORIGINS`: comma-separated origins (empty = allow all)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT").or_else(|| get(PORT_VAR)) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| invalid(PORT_VAR, &value, "expected a port number"))?,
            None => defaults.port,
        };

        let request_timeout = match get(REQUEST_TIMEOUT_VAR) {
            Some(value) => Duration::from_millis(parse_positive(REQUEST_TIMEOUT_VAR, &value)?),
            None => defaults.request_timeout,
        };

        let cache_ttl = match get(CACHE_TTL_VAR) {
            Some(value) => {
                let secs = parse_positive(CACHE_TTL_VAR, &value)?;
                if secs > MAX_CACHE_TTL_SECS {
                    return Err(invalid(
                        CACHE_TTL_VAR,
                        &value,
                        &format!("must be at most {} seconds", MAX_CACHE_TTL_SECS),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.cache_ttl,
        };

        let store = match get(STORE_VAR) {
            Some(value) => value.parse()?,
            None => defaults.store,
        };

        let cors_origins = get(CORS_ORIGINS_VAR)
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: get(BIND_VAR).unwrap_or(defaults.host),
            port,
            request_timeout,
            cache_ttl,
            results_dir: get(RESULTS_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            store,
            cors_origins,
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| invalid(BIND_VAR, &addr, &e.to_string()))
    }
}

fn parse_positive(field: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(field, value, "expected a positive integer")),
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.request_timeout, Duration::from_millis(5_000));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.store, StoreBackend::Postgres);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            (REQUEST_TIMEOUT_VAR, "250"),
            (CACHE_TTL_VAR, "5"),
            (RESULTS_DIR_VAR, "/tmp/runs"),
            (STORE_VAR, "memory"),
            (CORS_ORIGINS_VAR, "http://a.test, ,http://b.test"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert_eq!(config.results_dir, PathBuf::from("/tmp/runs"));
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ApiConfig::from_lookup(lookup(&[(PORT_VAR, "99999")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(REQUEST_TIMEOUT_VAR, "0")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(CACHE_TTL_VAR, "soon")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(CACHE_TTL_VAR, "18446744073709551615")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[(STORE_VAR, "redis")])).is_err());
    }

    #[test]
    fn test_cache_ttl_upper_bound() {
        let max = MAX_CACHE_TTL_SECS.to_string();
        let config = ApiConfig::from_lookup(lookup(&[(CACHE_TTL_VAR, max.as_str())])).unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(MAX_CACHE_TTL_SECS));

        let over = (MAX_CACHE_TTL_SECS + 1).to_string();
        let err = ApiConfig::from_lookup(lookup(&[(CACHE_TTL_VAR, over.as_str())])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == CACHE_TTL_VAR));
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr().unwrap().port(), 3000);

        let config = ApiConfig {
            host: "not an address".to_string(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
    }
}
