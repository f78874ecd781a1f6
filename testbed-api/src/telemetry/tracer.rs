//! Tracing subscriber initialization
//!
//! JSON-formatted structured logs filtered by `RUST_LOG`, falling back to a
//! development default.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "testbed_api=debug,testbed_storage=info,tower_http=info,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("TESTBED_SERVICE_NAME")
                .unwrap_or_else(|_| "testbed-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            json: std::env::var("TESTBED_LOG_FORMAT")
                .map(|s| s != "pretty")
                .unwrap_or(true),
        }
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        assert!(!config.service_name.is_empty());
    }
}
