// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock provider adapter for deterministic testing.
//!
//! `MockProvider` parses webhooks exactly like the real Z-API or Evolution
//! adapter but never touches the network: sends are captured and answered
//! from a FIFO queue of scripted [`SendResult`]s.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use relaydesk_core::types::{AdapterType, HealthStatus, Inbound, SendResult};
use relaydesk_core::{MessagingProvider, PluginAdapter, RelaydeskError};
use relaydesk_whatsapp::{auth, evolution, zapi};

/// One captured outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    /// `text`, `media`, `document` or `file`.
    pub kind: &'static str,
    /// Text body, media URL, or base64 payload.
    pub payload: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Clone, Copy)]
enum Dialect {
    Zapi,
    Evolution,
}

/// A provider that returns pre-configured send results.
///
/// Results are popped from a FIFO queue. When the queue is empty, a
/// successful send with id `MOCK-{n}` is returned.
pub struct MockProvider {
    dialect: Dialect,
    webhook_secret: String,
    results: Arc<Mutex<VecDeque<SendResult>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    counter: AtomicU64,
}

impl MockProvider {
    /// A `zapi` adapter expecting `webhook_secret` in the `Client-Token` header.
    pub fn zapi(webhook_secret: &str) -> Self {
        Self::with_dialect(Dialect::Zapi, webhook_secret)
    }

    /// An `evolution` adapter expecting `webhook_secret` in the payload `apikey`.
    pub fn evolution(webhook_secret: &str) -> Self {
        Self::with_dialect(Dialect::Evolution, webhook_secret)
    }

    fn with_dialect(dialect: Dialect, webhook_secret: &str) -> Self {
        Self {
            dialect,
            webhook_secret: webhook_secret.to_string(),
            results: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            counter: AtomicU64::new(0),
        }
    }

    /// Queue the result of a future send.
    pub async fn push_result(&self, result: SendResult) {
        self.results.lock().await.push_back(result);
    }

    /// Every send so far, in order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    async fn record(&self, message: SentMessage) -> SendResult {
        self.sent.lock().await.push(message);
        let scripted = self.results.lock().await.pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            SendResult::sent(Some(format!("MOCK-{n}")))
        })
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        match self.dialect {
            Dialect::Zapi => "zapi",
            Dialect::Evolution => "evolution",
        }
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RelaydeskError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for MockProvider {
    async fn send_text(&self, to: &str, body: &str) -> SendResult {
        self.record(SentMessage {
            to: to.to_string(),
            kind: "text",
            payload: body.to_string(),
            caption: None,
            file_name: None,
        })
        .await
    }

    async fn send_media(&self, to: &str, media_url: &str, caption: Option<&str>) -> SendResult {
        self.record(SentMessage {
            to: to.to_string(),
            kind: "media",
            payload: media_url.to_string(),
            caption: caption.map(str::to_string),
            file_name: None,
        })
        .await
    }

    async fn send_document(
        &self,
        to: &str,
        document_url: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult {
        self.record(SentMessage {
            to: to.to_string(),
            kind: "document",
            payload: document_url.to_string(),
            caption: caption.map(str::to_string),
            file_name: Some(file_name.to_string()),
        })
        .await
    }

    async fn send_file_base64(
        &self,
        to: &str,
        base64: &str,
        _mime_type: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult {
        self.record(SentMessage {
            to: to.to_string(),
            kind: "file",
            payload: base64.to_string(),
            caption: caption.map(str::to_string),
            file_name: Some(file_name.to_string()),
        })
        .await
    }

    fn auth_header(&self) -> Option<&'static str> {
        match self.dialect {
            Dialect::Zapi => Some(zapi::CLIENT_TOKEN_HEADER),
            Dialect::Evolution => None,
        }
    }

    fn validate_webhook(&self, payload: &Value, auth_header: Option<&str>) -> bool {
        let presented = match self.dialect {
            Dialect::Zapi => auth_header,
            Dialect::Evolution => payload.get("apikey").and_then(Value::as_str),
        };
        auth::secret_matches(Some(&self.webhook_secret), presented)
    }

    fn parse_incoming(&self, payload: &Value) -> Inbound {
        match self.dialect {
            Dialect::Zapi => zapi::parse_payload(payload),
            Dialect::Evolution => evolution::parse_payload(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_results_then_default_ids() {
        let provider = MockProvider::zapi("secret");
        provider
            .push_result(SendResult::failed("rate limited", true))
            .await;

        let first = provider.send_text("5511", "a").await;
        assert!(!first.success);
        let second = provider.send_text("5511", "b").await;
        assert_eq!(second.provider_message_id.as_deref(), Some("MOCK-1"));

        let sent = provider.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload, "b");
    }

    #[test]
    fn authenticates_like_the_real_adapters() {
        let zapi = MockProvider::zapi("secret");
        assert!(zapi.validate_webhook(&json!({}), Some("secret")));
        assert!(!zapi.validate_webhook(&json!({"apikey": "secret"}), None));

        let evolution = MockProvider::evolution("secret");
        assert!(evolution.validate_webhook(&json!({"apikey": "secret"}), None));
        assert!(!evolution.validate_webhook(&json!({}), Some("secret")));
    }
}
