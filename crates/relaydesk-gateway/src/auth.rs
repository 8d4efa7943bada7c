// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token middleware for the `/v1` operator API.
//!
//! When no token is configured, all requests are rejected (fail-closed).
//! Webhook routes do not pass through here: each provider adapter
//! authenticates its own callbacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use relaydesk_whatsapp::auth::constant_time_eq;

/// Authentication configuration for the operator API.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer token. `None` rejects every request.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    /// Whether `authorization` carries the configured bearer token.
    pub fn accepts(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.bearer_token.as_deref().filter(|t| !t.is_empty()) else {
            return false;
        };
        authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| constant_time_eq(token.trim().as_bytes(), expected.as_bytes()))
    }
}

/// Middleware that validates the `Authorization: Bearer <token>` header.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.bearer_token.is_none() {
        tracing::error!("operator API has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let authorization = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    if auth.accepts(authorization) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(path = %request.uri().path(), "operator API request rejected");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> AuthConfig {
        AuthConfig {
            bearer_token: token.map(str::to_string),
        }
    }

    #[test]
    fn accepts_matching_bearer_token() {
        let auth = config(Some("secret-token"));
        assert!(auth.accepts(Some("Bearer secret-token")));
        assert!(!auth.accepts(Some("Bearer other")));
        assert!(!auth.accepts(Some("secret-token")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn fails_closed_without_token() {
        assert!(!config(None).accepts(Some("Bearer anything")));
        assert!(!config(Some("")).accepts(Some("Bearer ")));
    }

    #[test]
    fn debug_redacts_token() {
        let debug_output = format!("{:?}", config(Some("secret-token")));
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[redacted]"));
    }
}
