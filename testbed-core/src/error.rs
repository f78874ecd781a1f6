//! Error types for testbed operations

use thiserror::Error;

use crate::{ProductId, UserId};

/// Data-store errors.
///
/// `MissingProducts` and `UserNotFound` are client-side problems (a request
/// referenced something that does not exist); everything else is a store
/// failure the caller cannot fix by changing the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Products not found: {ids:?}")]
    MissingProducts { ids: Vec<ProductId> },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: UserId },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Connection unavailable: {reason}")]
    ConnectionUnavailable { reason: String },

    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether the error was caused by the request referencing a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::MissingProducts { .. } | StorageError::UserNotFound { .. }
        )
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::PoolTimeout | StorageError::ConnectionUnavailable { .. }
        )
    }
}

/// Request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors, raised once at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Cache backend errors. Never surfaced to API callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache entry could not be encoded: {reason}")]
    Encoding { reason: String },
}

/// Master error type for all testbed errors.
#[derive(Debug, Clone, Error)]
pub enum TestbedError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for testbed operations.
pub type TestbedResult<T> = Result<T, TestbedError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_missing_products() {
        let err = StorageError::MissingProducts { ids: vec![7, 9] };
        let msg = format!("{}", err);
        assert!(msg.contains("Products not found"));
        assert!(msg.contains('7'));
        assert!(msg.contains('9'));
    }

    #[test]
    fn test_storage_error_classification() {
        assert!(StorageError::MissingProducts { ids: vec![1] }.is_not_found());
        assert!(StorageError::UserNotFound { user_id: 3 }.is_not_found());
        assert!(!StorageError::PoolTimeout.is_not_found());

        assert!(StorageError::PoolTimeout.is_retryable());
        assert!(StorageError::ConnectionUnavailable {
            reason: "refused".to_string()
        }
        .is_retryable());
        assert!(!StorageError::QueryFailed {
            reason: "syntax".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "TESTBED_MODE".to_string(),
            value: "fast".to_string(),
            reason: "expected baseline or optimized".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("TESTBED_MODE"));
        assert!(msg.contains("fast"));
        assert!(msg.contains("expected baseline or optimized"));
    }

    #[test]
    fn test_testbed_error_from_variants() {
        let storage = TestbedError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, TestbedError::Storage(_)));

        let validation = TestbedError::from(ValidationError::RequiredFieldMissing {
            field: "items".to_string(),
        });
        assert!(matches!(validation, TestbedError::Validation(_)));

        let cache = TestbedError::from(CacheError::Unavailable {
            reason: "down".to_string(),
        });
        assert!(matches!(cache, TestbedError::Cache(_)));
    }
}
