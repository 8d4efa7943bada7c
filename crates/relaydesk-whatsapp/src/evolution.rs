// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evolution API provider adapter.
//!
//! Evolution wraps Baileys events as `{event, instance, apikey, data}`. The
//! webhook credential travels inside the payload (`apikey`), so
//! [`auth_header`](MessagingProvider::auth_header) is `None`. Events arrive
//! either dotted (`messages.upsert`) or upper-snake (`MESSAGES_UPSERT`)
//! depending on server configuration; both are accepted.

use std::time::Duration;

use async_trait::async_trait;
use relaydesk_config::model::EvolutionConfig;
use relaydesk_core::types::{
    AdapterType, CanonicalMessage, DeliveryStatus, HealthStatus, IgnoreReason, Inbound, MediaKind,
    MediaRef, SendResult, StatusCallback, mime_for_path, normalize_phone,
};
use relaydesk_core::{MessagingProvider, PluginAdapter, RelaydeskError};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;

use crate::auth;
use crate::http::{self, str_field};

/// Evolution API adapter.
pub struct EvolutionProvider {
    client: reqwest::Client,
    base_url: String,
    instance: String,
    webhook_secret: String,
}

impl EvolutionProvider {
    /// Creates an adapter with a pooled client bounded by `timeout`.
    pub fn new(config: EvolutionConfig, timeout: Duration) -> Result<Self, RelaydeskError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.api_key).map_err(|e| {
                RelaydeskError::Config(format!("invalid Evolution API key header value: {e}"))
            })?,
        );
        let client = http::build_client(headers, timeout)?;
        let webhook_secret = config.webhook_secret().to_string();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            instance: config.instance,
            webhook_secret,
        })
    }

    async fn post(&self, action: &str, body: Value) -> SendResult {
        debug!(action, instance = %self.instance, "sending via Evolution API");
        let url = format!("{}/message/{}/{}", self.base_url, action, self.instance);
        let request = self.client.post(url).json(&body);
        http::execute("evolution", request, extract_message_id).await
    }

    async fn send_media_payload(
        &self,
        to: &str,
        kind: MediaKind,
        media: &str,
        mime_type: Option<&str>,
        file_name: Option<&str>,
        caption: Option<&str>,
    ) -> SendResult {
        let number = normalize_phone(to);
        if kind == MediaKind::Audio {
            return self
                .post("sendWhatsAppAudio", json!({"number": number, "audio": media}))
                .await;
        }

        let mut body = json!({
            "number": number,
            "mediatype": kind.to_string(),
            "media": media,
        });
        if let Some(mime) = mime_type {
            body["mimetype"] = json!(mime);
        }
        if let Some(name) = file_name {
            body["fileName"] = json!(name);
        }
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        self.post("sendMedia", body).await
    }
}

fn extract_message_id(body: &Value) -> Option<String> {
    body.get("key")
        .and_then(|k| str_field(k, "id"))
        .or_else(|| str_field(body, "id"))
}

#[async_trait]
impl PluginAdapter for EvolutionProvider {
    fn name(&self) -> &str {
        "evolution"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RelaydeskError> {
        if self.webhook_secret.is_empty() {
            return Ok(HealthStatus::Degraded(
                "empty webhook api key; inbound webhooks are rejected".into(),
            ));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for EvolutionProvider {
    async fn send_text(&self, to: &str, body: &str) -> SendResult {
        self.post(
            "sendText",
            json!({"number": normalize_phone(to), "text": body}),
        )
        .await
    }

    async fn send_media(&self, to: &str, media_url: &str, caption: Option<&str>) -> SendResult {
        let mime = mime_for_path(media_url);
        let kind = mime.map(MediaKind::from_mime).unwrap_or(MediaKind::Image);
        self.send_media_payload(to, kind, media_url, mime, None, caption)
            .await
    }

    async fn send_document(
        &self,
        to: &str,
        document_url: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult {
        let mime = mime_for_path(file_name).or_else(|| mime_for_path(document_url));
        self.send_media_payload(
            to,
            MediaKind::Document,
            document_url,
            mime,
            Some(file_name),
            caption,
        )
        .await
    }

    async fn send_file_base64(
        &self,
        to: &str,
        base64: &str,
        mime_type: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult {
        self.send_media_payload(
            to,
            MediaKind::from_mime(mime_type),
            base64,
            Some(mime_type),
            Some(file_name),
            caption,
        )
        .await
    }

    fn auth_header(&self) -> Option<&'static str> {
        None
    }

    fn validate_webhook(&self, payload: &Value, _auth_header: Option<&str>) -> bool {
        let presented = payload.get("apikey").and_then(Value::as_str);
        auth::secret_matches(Some(&self.webhook_secret), presented)
    }

    fn parse_incoming(&self, payload: &Value) -> Inbound {
        parse_payload(payload)
    }
}

/// `MESSAGES_UPSERT` and `messages.upsert` both become `messages.upsert`.
fn normalize_event(event: &str) -> String {
    event.to_ascii_lowercase().replace('_', ".")
}

/// Normalizes one Evolution webhook body.
pub fn parse_payload(payload: &Value) -> Inbound {
    let raw_event = payload.get("event").and_then(Value::as_str).unwrap_or("");
    match normalize_event(raw_event).as_str() {
        "messages.upsert" => parse_upsert(payload),
        "messages.update" => parse_update(payload),
        "" => Inbound::Ignored(IgnoreReason::UnsupportedEvent("unknown".into())),
        _ => Inbound::Ignored(IgnoreReason::UnsupportedEvent(raw_event.to_string())),
    }
}

/// Classifies a JID that cannot belong to a one-to-one customer chat.
fn non_customer_jid(jid: &str) -> Option<IgnoreReason> {
    if jid.ends_with("@g.us") {
        Some(IgnoreReason::Group)
    } else if jid.ends_with("@newsletter") {
        Some(IgnoreReason::Newsletter)
    } else if jid.ends_with("@broadcast") {
        Some(IgnoreReason::Broadcast)
    } else {
        None
    }
}

fn parse_upsert(payload: &Value) -> Inbound {
    // Older servers wrap upserts as `data.messages[0]`.
    let data = match payload.get("data") {
        Some(d) => d
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|m| m.first())
            .unwrap_or(d),
        None => return Inbound::Ignored(IgnoreReason::MissingMessageId),
    };
    let Some(key) = data.get("key") else {
        return Inbound::Ignored(IgnoreReason::MissingMessageId);
    };

    let remote_jid = key.get("remoteJid").and_then(Value::as_str).unwrap_or("");
    if let Some(reason) = non_customer_jid(remote_jid) {
        return Inbound::Ignored(reason);
    }

    let Some(message_id) = str_field(key, "id") else {
        return Inbound::Ignored(IgnoreReason::MissingMessageId);
    };

    let Some(message) = data.get("message") else {
        return Inbound::Ignored(IgnoreReason::UnsupportedContent);
    };
    let text = message
        .get("conversation")
        .and_then(Value::as_str)
        .or_else(|| {
            message
                .get("extendedTextMessage")
                .and_then(|e| e.get("text"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);
    let media = parse_media(message);
    if text.is_none() && media.is_none() {
        return Inbound::Ignored(IgnoreReason::UnsupportedContent);
    }

    // Chats addressed by LID carry the phone JID in an alternate field.
    let (customer_phone, chat_lid) = if remote_jid.ends_with("@lid") {
        let phone = ["remoteJidAlt", "senderPn"]
            .iter()
            .find_map(|k| key.get(*k).and_then(Value::as_str))
            .map(normalize_phone)
            .unwrap_or_default();
        (phone, Some(remote_jid.to_string()))
    } else {
        (normalize_phone(remote_jid), None)
    };
    let business_phone = payload
        .get("sender")
        .and_then(Value::as_str)
        .map(normalize_phone)
        .unwrap_or_default();

    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);
    let (sender, recipient) = if from_me {
        (business_phone, customer_phone)
    } else {
        (customer_phone, business_phone)
    };

    Inbound::Message(Box::new(CanonicalMessage {
        provider_message_id: message_id,
        sender,
        recipient,
        body: text,
        media,
        from_me,
        sender_name: str_field(data, "pushName"),
        provider: "evolution".to_string(),
        chat_lid,
        instance_id: str_field(payload, "instance"),
        timestamp: data.get("messageTimestamp").and_then(|t| {
            t.as_i64()
                .or_else(|| t.as_str().and_then(|s| s.parse().ok()))
        }),
        raw: payload.clone(),
    }))
}

fn parse_media(message: &Value) -> Option<MediaRef> {
    const SHAPES: [(&str, MediaKind); 4] = [
        ("audioMessage", MediaKind::Audio),
        ("imageMessage", MediaKind::Image),
        ("videoMessage", MediaKind::Video),
        ("documentMessage", MediaKind::Document),
    ];
    SHAPES.iter().find_map(|(key, kind)| {
        let node = message.get(*key)?;
        let url = str_field(node, "url")?;
        Some(MediaRef {
            kind: *kind,
            url,
            mime_type: str_field(node, "mimetype"),
            duration_secs: node
                .get("seconds")
                .and_then(Value::as_u64)
                .and_then(|s| u32::try_from(s).ok()),
            ptt: node.get("ptt").and_then(Value::as_bool).unwrap_or(false),
            caption: str_field(node, "caption"),
            file_name: str_field(node, "fileName").or_else(|| str_field(node, "title")),
        })
    })
}

/// Maps an Evolution ack, given as a name or as the Baileys numeric code.
fn map_status(value: &Value) -> Result<DeliveryStatus, String> {
    let name = match value {
        Value::Number(n) => match n.as_u64() {
            Some(0) => "ERROR",
            Some(1) => "PENDING",
            Some(2) => "SERVER_ACK",
            Some(3) => "DELIVERY_ACK",
            Some(4) => "READ",
            Some(5) => "PLAYED",
            _ => return Err(n.to_string()),
        },
        Value::String(s) => s.as_str(),
        other => return Err(other.to_string()),
    };
    match name.to_ascii_uppercase().as_str() {
        "PENDING" => Ok(DeliveryStatus::Pending),
        "SERVER_ACK" => Ok(DeliveryStatus::Sent),
        "DELIVERY_ACK" => Ok(DeliveryStatus::Delivered),
        "READ" | "PLAYED" => Ok(DeliveryStatus::Read),
        "ERROR" => Ok(DeliveryStatus::Failed),
        _ => Err(name.to_string()),
    }
}

fn update_message_id(entry: &Value) -> Option<String> {
    str_field(entry, "keyId")
        .or_else(|| entry.get("key").and_then(|k| str_field(k, "id")))
        .or_else(|| str_field(entry, "messageId"))
}

fn update_status(entry: &Value) -> Option<&Value> {
    entry
        .get("status")
        .or_else(|| entry.get("update").and_then(|u| u.get("status")))
}

fn parse_update(payload: &Value) -> Inbound {
    let entries: Vec<&Value> = match payload.get("data") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
        None => Vec::new(),
    };
    let Some(first) = entries.first() else {
        return Inbound::Ignored(IgnoreReason::MissingMessageId);
    };
    if let Some(jid) = first.get("remoteJid").and_then(Value::as_str)
        && let Some(reason) = non_customer_jid(jid)
    {
        return Inbound::Ignored(reason);
    }

    let Some(raw_status) = update_status(first) else {
        return Inbound::Ignored(IgnoreReason::UntrackedStatus(String::new()));
    };
    let status = match map_status(raw_status) {
        Ok(status) => status,
        Err(untracked) => return Inbound::Ignored(IgnoreReason::UntrackedStatus(untracked)),
    };

    // A batch can mix acks; keep the entries that share the first entry's status.
    let ids: Vec<String> = entries
        .iter()
        .filter(|e| update_status(e).and_then(|s| map_status(s).ok()) == Some(status))
        .filter_map(|e| update_message_id(e))
        .collect();
    if ids.is_empty() {
        return Inbound::Ignored(IgnoreReason::MissingMessageId);
    }

    Inbound::Status(StatusCallback {
        provider_message_ids: ids,
        status,
        provider: "evolution".to_string(),
    })
}
