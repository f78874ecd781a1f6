//! Health check types
//!
//! Shared between the store implementations (which report their own
//! reachability) and the API health endpoints.

use serde::{Deserialize, Serialize};

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
}

/// Health check result for a single component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl HealthCheck {
    /// Create a healthy check result.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            response_time_ms: None,
        }
    }

    /// Create an unhealthy check result.
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
        }
    }

    /// Set the response time.
    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_serialization() {
        let check = HealthCheck::healthy("database").with_response_time(3);
        let json = serde_json::to_string(&check).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"response_time_ms\":3"));
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_unhealthy_carries_message() {
        let check = HealthCheck::unhealthy("database", "Connection refused");
        assert!(!check.is_healthy());
        assert_eq!(check.message.as_deref(), Some("Connection refused"));
    }
}
