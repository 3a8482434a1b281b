//! Error types and error handling utilities
//!
//! This module defines the core error types used throughout Tierdesk.
//! All errors are designed to be informative and actionable.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Core result type used throughout the application
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error types for Tierdesk
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum CoreError {
    /// Malformed input: bad status, unknown tier, weight sums off, etc.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown session/agent/evaluation/rule/prompt
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Escalation target outside the caller's authority, scoring by a
    /// non-assigned QA agent, and similar permission failures
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// State races: assigning an already-active session, appending to a
    /// completed session, concurrent status changes
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An escalation reason matched no configured rule
    #[error("No matching escalation rule for reason: {0}")]
    NoMatchingRule(String),

    /// No eligible agent for a required tier; the dispatcher retries on
    /// the next availability event
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Persistence I/O failure; callers must treat as retryable
    #[error("Transient I/O error: {0}")]
    TransientIo(String),
}

impl CoreError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        CoreError::Validation(message.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(entity: S, id: S) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a not authorized error
    pub fn not_authorized<S: Into<String>>(message: S) -> Self {
        CoreError::NotAuthorized(message.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        CoreError::Conflict(message.into())
    }

    /// Create a transient I/O error
    pub fn transient_io<S: Into<String>>(message: S) -> Self {
        CoreError::TransientIo(message.into())
    }

    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        CoreError::Unavailable(message.into())
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Validation(_) => ErrorCategory::Validation,
            CoreError::NotFound { .. } => ErrorCategory::NotFound,
            CoreError::NotAuthorized(_) => ErrorCategory::Authorization,
            CoreError::Conflict(_) => ErrorCategory::Conflict,
            CoreError::NoMatchingRule(_) => ErrorCategory::Escalation,
            CoreError::Unavailable(_) => ErrorCategory::Capacity,
            CoreError::TransientIo(_) => ErrorCategory::Io,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TransientIo(_) | CoreError::Unavailable(_)
        )
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Authorization,
    Conflict,
    Escalation,
    Capacity,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Authorization => write!(f, "authorization"),
            ErrorCategory::Conflict => write!(f, "conflict"),
            ErrorCategory::Escalation => write!(f, "escalation"),
            ErrorCategory::Capacity => write!(f, "capacity"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Convert from validator::ValidationErrors
impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Serialization failures only surface at the persistence boundary here
impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::TransientIo(format!("serialization: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = CoreError::validation("bad tier");
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_not_found_error() {
        let error = CoreError::not_found("session", "sess_123");
        assert_eq!(error.category(), ErrorCategory::NotFound);

        match error {
            CoreError::NotFound { entity, id } => {
                assert_eq!(entity, "session");
                assert_eq!(id, "sess_123");
            }
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CoreError::transient_io("redis down").is_retryable());
        assert!(CoreError::unavailable("no tier 3 agent").is_retryable());
        assert!(!CoreError::validation("bad input").is_retryable());
        assert!(!CoreError::conflict("already active").is_retryable());
    }

    #[test]
    fn test_error_serialization() {
        let error = CoreError::NoMatchingRule("weather".to_string());
        let json = serde_json::to_string(&error).unwrap();
        let deserialized: CoreError = serde_json::from_str(&json).unwrap();

        assert_eq!(error.to_string(), deserialized.to_string());
    }
}
