//! Error taxonomy shared by every outbound dependency.
//!
//! Each variant carries a fixed [`ErrorClass`]: transient errors are worth
//! retrying and count toward a circuit breaker's failure threshold; permanent
//! errors are returned immediately and leave the breaker untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Unified error type for GitHub and model API calls.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Malformed caller input, e.g. an unparseable repository URL.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource does not exist or is not visible (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication or authorization failure (HTTP 401).
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Rate limited by the upstream service (HTTP 429, GitHub 403).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The request exceeded its per-attempt timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Upstream 5xx response.
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Connection-level failure before any response arrived.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Raised by an open circuit breaker without performing any I/O.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The response arrived but its shape was unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        ApiError::InvalidInput(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn access_denied<S: Into<String>>(msg: S) -> Self {
        ApiError::AccessDenied(msg.into())
    }

    pub fn rate_limited<S: Into<String>>(msg: S) -> Self {
        ApiError::RateLimited(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        ApiError::Timeout(msg.into())
    }

    pub fn server_error<S: Into<String>>(status: u16, msg: S) -> Self {
        ApiError::ServerError {
            status,
            message: msg.into(),
        }
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        ApiError::NetworkError(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        ApiError::ServiceUnavailable(msg.into())
    }

    pub fn invalid_response<S: Into<String>>(msg: S) -> Self {
        ApiError::InvalidResponse(msg.into())
    }

    /// Classification used by the retry wrapper and the circuit breaker.
    pub fn classification(&self) -> ErrorClass {
        match self {
            ApiError::RateLimited(_)
            | ApiError::Timeout(_)
            | ApiError::ServerError { .. }
            | ApiError::NetworkError(_)
            | ApiError::ServiceUnavailable(_) => ErrorClass::Transient,
            ApiError::InvalidInput(_)
            | ApiError::NotFound(_)
            | ApiError::AccessDenied(_)
            | ApiError::InvalidResponse(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.classification() == ErrorClass::Transient
    }
}

/// Convenience alias used throughout the workspace.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::invalid_input("bad repository url");
        assert_eq!(err.to_string(), "Invalid input: bad repository url");

        let err = ApiError::server_error(503, "upstream overloaded");
        assert_eq!(err.to_string(), "Server error (503): upstream overloaded");

        let err = ApiError::unavailable("github circuit open");
        assert_eq!(err.to_string(), "Service unavailable: github circuit open");
    }

    #[test]
    fn test_classification() {
        assert!(ApiError::rate_limited("429").is_transient());
        assert!(ApiError::timeout("30s elapsed").is_transient());
        assert!(ApiError::server_error(500, "boom").is_transient());
        assert!(ApiError::network("connection reset").is_transient());
        assert!(ApiError::unavailable("open").is_transient());

        assert!(!ApiError::invalid_input("bad url").is_transient());
        assert!(!ApiError::not_found("no such repo").is_transient());
        assert!(!ApiError::access_denied("401").is_transient());
        assert!(!ApiError::invalid_response("empty choices").is_transient());
    }

    #[test]
    fn test_error_class_serde() {
        let json = serde_json::to_string(&ErrorClass::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
        let back: ErrorClass = serde_json::from_str("\"permanent\"").unwrap();
        assert_eq!(back, ErrorClass::Permanent);
    }
}
