// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider webhook endpoints.
//!
//! Every authenticated callback is acknowledged with 200 and a JSON
//! [`WebhookOutcome`]; only an authenticity failure (401) or an unknown
//! provider route (404) is answered otherwise.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use relaydesk_core::MessagingProvider;
use relaydesk_ingest::WebhookOutcome;

use crate::error::ErrorResponse;
use crate::server::GatewayState;

/// POST /webhooks/{provider}
pub async fn post_provider_webhook(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(adapter) = state.registry.get(&provider) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown provider: {provider}"),
            }),
        )
            .into_response();
    };
    handle(&state, adapter, &headers, &body).await
}

/// POST /webhooks
///
/// Routed to whichever provider is active at the time of the request.
pub async fn post_active_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = state.registry.current();
    handle(&state, adapter, &headers, &body).await
}

async fn handle(
    state: &GatewayState,
    adapter: Arc<dyn MessagingProvider>,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    // A body that is not JSON still goes through authentication; an
    // authenticated one is then acknowledged as an unsupported event.
    let payload: serde_json::Value = serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "webhook body is not JSON");
        serde_json::Value::Null
    });
    let auth_header = adapter
        .auth_header()
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .pipeline
        .handle(adapter.as_ref(), &payload, auth_header)
        .await;
    let status = match outcome {
        WebhookOutcome::Rejected => StatusCode::UNAUTHORIZED,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}
