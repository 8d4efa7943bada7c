// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of errors onto HTTP responses for the operator API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relaydesk_core::RelaydeskError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// An operator API failure.
#[derive(Debug)]
pub enum ApiError {
    /// The request was well-formed JSON but semantically invalid.
    BadRequest(String),
    Relaydesk(RelaydeskError),
}

impl From<RelaydeskError> for ApiError {
    fn from(e: RelaydeskError) -> Self {
        ApiError::Relaydesk(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Relaydesk(RelaydeskError::NotFound { .. })
            | ApiError::Relaydesk(RelaydeskError::AdapterNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Relaydesk(RelaydeskError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Relaydesk(RelaydeskError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Relaydesk(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::BadRequest(message) => message,
            ApiError::Relaydesk(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "operator API request failed");
                }
                e.to_string()
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_taxonomy_to_status_codes() {
        let not_found: ApiError = RelaydeskError::not_found("media", "m-1").into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = RelaydeskError::InvalidTransition {
            entity: "media",
            from: "completed".into(),
            to: "received".into(),
        }
        .into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let internal: ApiError = RelaydeskError::Internal("boom".into()).into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
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
