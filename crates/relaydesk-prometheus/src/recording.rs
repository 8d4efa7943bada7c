// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. With no recorder installed the calls are no-ops.

use metrics::{describe_counter, describe_histogram};

/// Register all relaydesk metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "relaydesk_webhooks_total",
        "Webhooks handled, by provider and outcome"
    );
    describe_counter!(
        "relaydesk_unroutable_events_total",
        "Inbound events whose tenant could not be resolved"
    );
    describe_counter!(
        "relaydesk_media_jobs_total",
        "Media jobs that reached a terminal state, by status"
    );
    describe_counter!(
        "relaydesk_status_callbacks_total",
        "Delivery status updates, by result"
    );
    describe_counter!(
        "relaydesk_sends_total",
        "Outbound sends, by provider and result"
    );
    describe_histogram!(
        "relaydesk_media_download_seconds",
        "Media download duration in seconds"
    );
}

/// Record a handled webhook.
pub fn record_webhook(provider: &str, outcome: &'static str) {
    metrics::counter!(
        "relaydesk_webhooks_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an event that matched no tenant.
pub fn record_unroutable() {
    metrics::counter!("relaydesk_unroutable_events_total").increment(1);
}

/// Record a media job reaching `completed` or `failed`.
pub fn record_media_job(status: &'static str) {
    metrics::counter!("relaydesk_media_jobs_total", "status" => status).increment(1);
}

/// Record status callback ids by result (`applied`, `unchanged`, `unknown`).
pub fn record_status_callback(result: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("relaydesk_status_callbacks_total", "result" => result).increment(count);
    }
}

/// Record an outbound send after retries.
pub fn record_send(provider: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!(
        "relaydesk_sends_total",
        "provider" => provider.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record media download latency.
pub fn record_media_download(seconds: f64) {
    metrics::histogram!("relaydesk_media_download_seconds").record(seconds);
}
