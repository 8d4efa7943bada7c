// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request execution shared by the provider adapters.

use std::time::Duration;

use relaydesk_core::RelaydeskError;
use relaydesk_core::types::SendResult;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

/// Builds the pooled client every adapter uses for outbound calls.
pub(crate) fn build_client(
    headers: HeaderMap,
    timeout: Duration,
) -> Result<reqwest::Client, RelaydeskError> {
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| RelaydeskError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Returns true for statuses worth retrying: 429 and any 5xx.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sends a prepared request and folds every outcome into a [`SendResult`].
///
/// `extract_id` pulls the provider message id out of a successful JSON
/// response body. A 2xx with an unreadable body still counts as sent.
pub(crate) async fn execute(
    provider: &str,
    request: reqwest::RequestBuilder,
    extract_id: fn(&serde_json::Value) -> Option<String>,
) -> SendResult {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let retryable = e.is_timeout() || e.is_connect() || e.is_request();
            warn!(provider, error = %e, retryable, "send request failed");
            return SendResult::failed(format!("HTTP request failed: {e}"), retryable);
        }
    };

    let status = response.status();
    debug!(provider, status = %status, "send response received");

    if status.is_success() {
        let id = match response.json::<serde_json::Value>().await {
            Ok(body) => extract_id(&body),
            Err(e) => {
                warn!(provider, error = %e, "send succeeded but response body was not JSON");
                None
            }
        };
        return SendResult::sent(id);
    }

    let body = response.text().await.unwrap_or_default();
    let retryable = is_transient_status(status);
    warn!(provider, status = %status, body = %body, retryable, "provider rejected send");
    SendResult::failed(format!("API returned {status}: {body}"), retryable)
}

/// Reads a string field, accepting JSON numbers as well.
pub(crate) fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
