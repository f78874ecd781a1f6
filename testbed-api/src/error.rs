//! Error Types for the Testbed API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from the core error taxonomy
//!
//! All errors are serialized as JSON with appropriate HTTP status codes, and
//! every error response is recorded as a failed request by the recorder.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use testbed_core::{ConfigError, StorageError, TestbedError, ValidationError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Request references an entity that does not exist
    ReferencedEntityNotFound,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::MissingField => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::EntityNotFound | ErrorCode::ReferencedEntityNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::ReferencedEntityNotFound => "Referenced entity not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
            ErrorCode::Timeout => "Operation timed out",
        }
    }

    /// Whether a client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted | ErrorCode::Timeout
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (missing ids, field errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn referenced_entity_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReferencedEntityNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

/// Malformed or mistyped JSON bodies are client errors.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid_input(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

/// Map errors raised by the tower middleware stack.
pub async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request exceeded its deadline");
        ApiError::timeout("request")
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        ApiError::internal_error("Unhandled internal error")
    }
}

// ============================================================================
// CONVERSIONS FROM CORE ERRORS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingProducts { ids } => ApiError::referenced_entity_not_found(
                format!("Products not found: {:?}", ids),
            )
            .with_details(serde_json::json!({ "missingProductIds": ids })),
            StorageError::UserNotFound { user_id } => ApiError::entity_not_found("User", user_id),
            StorageError::PoolTimeout => {
                tracing::warn!("Timed out waiting for a database connection");
                ApiError::connection_pool_exhausted()
            }
            StorageError::ConnectionUnavailable { reason } => {
                tracing::error!(%reason, "Data store unavailable");
                ApiError::service_unavailable("Data store is unavailable")
            }
            StorageError::QueryFailed { reason } | StorageError::TransactionFailed { reason } => {
                // Full reason is logged; the response stays generic.
                tracing::error!(%reason, "Database error");
                ApiError::database_error("Database operation failed")
            }
            StorageError::LockPoisoned => ApiError::internal_error("Storage lock poisoned"),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            ValidationError::InvalidValue { field, reason } => {
                ApiError::validation_failed(format!("Invalid value for {}: {}", field, reason))
                    .with_details(serde_json::json!({ "field": field, "reason": reason }))
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Configuration error: {}", err))
    }
}

impl From<TestbedError> for ApiError {
    fn from(err: TestbedError) -> Self {
        match err {
            TestbedError::Storage(e) => e.into(),
            TestbedError::Validation(e) => e.into(),
            TestbedError::Config(e) => e.into(),
            TestbedError::Cache(e) => ApiError::internal_error(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::internal_error("Failed to encode response")
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ReferencedEntityNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::ConnectionPoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::ConnectionPoolExhausted.is_retryable());
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::DatabaseError.is_retryable());
        assert!(!ErrorCode::ValidationFailed.is_retryable());
    }

    #[test]
    fn test_missing_products_map_to_404_with_ids() {
        let err: ApiError = StorageError::MissingProducts { ids: vec![3, 7] }.into();
        assert_eq!(err.code, ErrorCode::ReferencedEntityNotFound);
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "missingProductIds": [3, 7] }))
        );
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: ApiError = StorageError::PoolTimeout.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = StorageError::QueryFailed {
            reason: "relation \"orders\" does not exist".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("relation"));

        let err: ApiError = StorageError::UserNotFound { user_id: 9 }.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.message.contains('9'));
    }

    #[test]
    fn test_validation_error_mapping() {
        let err: ApiError = ValidationError::RequiredFieldMissing {
            field: "userId".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("userId"));

        let err: ApiError = ValidationError::InvalidValue {
            field: "items[0].quantity".to_string(),
            reason: "must be between 1 and 100".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.details.is_some());
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::timeout("checkout");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("TIMEOUT"));
        assert!(json.contains("checkout"));
        assert!(!json.contains("details"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }
}
