//! Error types for SentientIQ
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using SentientError
pub type Result<T> = std::result::Result<T, SentientError>;

/// Unified error type for SentientIQ operations
#[derive(Debug, Error)]
pub enum SentientError {
    // Telemetry errors
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    // Rule catalog errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    // Dispatch errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed or unrecognized client telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Event has no type tag")]
    MissingType,

    #[error("Session id is required")]
    MissingSession,

    #[error("Confidence out of range: {0}")]
    ConfidenceOutOfRange(i64),
}

/// Intervention rule catalog errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule not found: {0}")]
    NotFound(String),

    #[error("Rule {rule_id} has invalid variants: {reason}")]
    InvalidVariants { rule_id: String, reason: String },

    #[error("Rule {rule_id} has no actions")]
    NoActions { rule_id: String },

    #[error("Failed to load rule catalog: {0}")]
    Catalog(String),
}

/// Real-time delivery errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No live connection for session {0}")]
    NoRoute(String),

    #[error("Outbound buffer full for session {0}")]
    BufferFull(String),

    #[error("Connection closed for session {0}")]
    Closed(String),
}

impl From<serde_json::Error> for SentientError {
    fn from(err: serde_json::Error) -> Self {
        SentientError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SentientError {
    fn from(err: std::io::Error) -> Self {
        SentientError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for SentientError {
    fn from(err: anyhow::Error) -> Self {
        SentientError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SentientError::Rule(RuleError::NotFound("cart_rescue".to_string()));
        assert!(err.to_string().contains("cart_rescue"));
    }

    #[test]
    fn test_dispatch_error() {
        let err: SentientError = DispatchError::NoRoute("sess-1".to_string()).into();
        assert!(err.to_string().contains("sess-1"));
    }
}
