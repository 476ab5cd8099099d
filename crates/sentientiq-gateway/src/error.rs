//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sentientiq_common::{RuleError, SentientError};
use serde_json::json;
use tracing::error;

/// Error body `{"error": "..."}` with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Generic 500; the detail only goes to the log
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SentientError> for ApiError {
    fn from(err: SentientError) -> Self {
        match &err {
            SentientError::Telemetry(_) => Self::bad_request(err.to_string()),
            SentientError::Rule(RuleError::NotFound(_)) => Self::not_found(err.to_string()),
            SentientError::Rule(_) => Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            _ => Self::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sentientiq_common::TelemetryError;

    #[test]
    fn test_status_mapping() {
        let bad: ApiError = SentientError::from(TelemetryError::MissingSession).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = SentientError::from(RuleError::NotFound("x".into())).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let internal: ApiError = SentientError::Storage("down".into()).into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message, "Internal server error");
    }
}
