// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`IndicaError`] to JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use indica_core::IndicaError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// Handler error carrying the domain error through to the response.
#[derive(Debug)]
pub struct ApiError(pub IndicaError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            IndicaError::Validation(_) => StatusCode::BAD_REQUEST,
            IndicaError::NotFound { .. } => StatusCode::NOT_FOUND,
            IndicaError::Conflict(_) | IndicaError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            IndicaError::Provider { .. } | IndicaError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            IndicaError::Config(_) | IndicaError::Storage { .. } | IndicaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<IndicaError> for ApiError {
    fn from(err: IndicaError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use indica_core::QueueStatus;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (IndicaError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (IndicaError::not_found("flow", "f1"), StatusCode::NOT_FOUND),
            (IndicaError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                IndicaError::InvalidTransition {
                    id: "q1".into(),
                    from: QueueStatus::Completed,
                    to: QueueStatus::Retry,
                },
                StatusCode::CONFLICT,
            ),
            (
                IndicaError::Timeout {
                    duration: std::time::Duration::from_secs(1),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (IndicaError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }

    #[test]
    fn error_response_serializes() {
        let resp = ErrorResponse {
            error: "something went wrong".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"error":"something went wrong"}"#);
    }
}
