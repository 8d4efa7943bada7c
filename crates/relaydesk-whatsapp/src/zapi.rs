// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Z-API provider adapter.
//!
//! Z-API posts flat JSON webhooks (`ReceivedCallback`,
//! `MessageStatusCallback`, ...) and authenticates them with the account
//! security token in the `Client-Token` header. Sends go to
//! `{base_url}/instances/{instance}/token/{token}/send-*`.

use std::time::Duration;

use async_trait::async_trait;
use relaydesk_config::model::ZapiConfig;
use relaydesk_core::types::{
    AdapterType, CanonicalMessage, DeliveryStatus, HealthStatus, IgnoreReason, Inbound, MediaKind,
    MediaRef, SendResult, StatusCallback, extension_for_mime, mime_for_path, normalize_phone,
};
use relaydesk_core::{MessagingProvider, PluginAdapter, RelaydeskError};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;

use crate::auth;
use crate::http::{self, str_field};

/// Header Z-API uses for the account security token.
pub const CLIENT_TOKEN_HEADER: &str = "Client-Token";

/// Z-API adapter.
pub struct ZapiProvider {
    client: reqwest::Client,
    base_url: String,
    instance_id: String,
    token: String,
    webhook_token: Option<String>,
}

impl ZapiProvider {
    /// Creates an adapter with a pooled client bounded by `timeout`.
    pub fn new(config: ZapiConfig, timeout: Duration) -> Result<Self, RelaydeskError> {
        let mut headers = HeaderMap::new();
        if let Some(client_token) = config.client_token.as_deref() {
            headers.insert(
                CLIENT_TOKEN_HEADER,
                HeaderValue::from_str(client_token).map_err(|e| {
                    RelaydeskError::Config(format!("invalid Z-API client token header value: {e}"))
                })?,
            );
        }
        let client = http::build_client(headers, timeout)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            instance_id: config.instance_id,
            token: config.token,
            webhook_token: config.webhook_token,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/instances/{}/token/{}/{}",
            self.base_url, self.instance_id, self.token, action
        )
    }

    async fn post(&self, action: &str, body: Value) -> SendResult {
        debug!(action, "sending via Z-API");
        let request = self.client.post(self.endpoint(action)).json(&body);
        http::execute("zapi", request, extract_message_id).await
    }

    /// Routes a URL or data URI to the matching `send-image|audio|video`
    /// endpoint, or to `send-document/{ext}` for anything else.
    async fn send_by_kind(
        &self,
        to: &str,
        kind: MediaKind,
        media: &str,
        file_name: Option<&str>,
        extension: &str,
        caption: Option<&str>,
    ) -> SendResult {
        let phone = normalize_phone(to);
        match kind {
            MediaKind::Image => {
                self.post(
                    "send-image",
                    json!({"phone": phone, "image": media, "caption": caption.unwrap_or_default()}),
                )
                .await
            }
            MediaKind::Audio => {
                self.post("send-audio", json!({"phone": phone, "audio": media}))
                    .await
            }
            MediaKind::Video => {
                self.post(
                    "send-video",
                    json!({"phone": phone, "video": media, "caption": caption.unwrap_or_default()}),
                )
                .await
            }
            MediaKind::Document => {
                let mut body = json!({"phone": phone, "document": media});
                if let Some(name) = file_name {
                    body["fileName"] = json!(name);
                }
                if let Some(caption) = caption {
                    body["caption"] = json!(caption);
                }
                self.post(&format!("send-document/{extension}"), body).await
            }
        }
    }
}

fn extract_message_id(body: &Value) -> Option<String> {
    str_field(body, "messageId")
        .or_else(|| str_field(body, "zaapId"))
        .or_else(|| str_field(body, "id"))
}

/// Extension for a document, from its file name or else its MIME type.
fn document_extension(file_name: &str, mime_type: Option<&str>) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .or_else(|| mime_type.and_then(extension_for_mime).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string())
}

#[async_trait]
impl PluginAdapter for ZapiProvider {
    fn name(&self) -> &str {
        "zapi"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RelaydeskError> {
        if self.webhook_token.as_deref().is_none_or(str::is_empty) {
            return Ok(HealthStatus::Degraded(
                "no webhook token configured; inbound webhooks are rejected".into(),
            ));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelaydeskError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for ZapiProvider {
    async fn send_text(&self, to: &str, body: &str) -> SendResult {
        self.post(
            "send-text",
            json!({"phone": normalize_phone(to), "message": body}),
        )
        .await
    }

    async fn send_media(&self, to: &str, media_url: &str, caption: Option<&str>) -> SendResult {
        let mime = mime_for_path(media_url);
        let kind = mime.map(MediaKind::from_mime).unwrap_or(MediaKind::Image);
        let ext = mime.and_then(extension_for_mime).unwrap_or("bin");
        self.send_by_kind(to, kind, media_url, None, ext, caption)
            .await
    }

    async fn send_document(
        &self,
        to: &str,
        document_url: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult {
        let ext = document_extension(file_name, mime_for_path(document_url));
        self.send_by_kind(
            to,
            MediaKind::Document,
            document_url,
            Some(file_name),
            &ext,
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
        let data_uri = format!("data:{mime_type};base64,{base64}");
        let ext = document_extension(file_name, Some(mime_type));
        self.send_by_kind(
            to,
            MediaKind::from_mime(mime_type),
            &data_uri,
            Some(file_name),
            &ext,
            caption,
        )
        .await
    }

    fn auth_header(&self) -> Option<&'static str> {
        Some(CLIENT_TOKEN_HEADER)
    }

    fn validate_webhook(&self, _payload: &Value, auth_header: Option<&str>) -> bool {
        auth::secret_matches(self.webhook_token.as_deref(), auth_header)
    }

    fn parse_incoming(&self, payload: &Value) -> Inbound {
        parse_payload(payload)
    }
}

/// Normalizes one Z-API webhook body.
pub fn parse_payload(payload: &Value) -> Inbound {
    let event = payload.get("type").and_then(Value::as_str).unwrap_or("");
    match event {
        "ReceivedCallback" => parse_received(payload),
        "MessageStatusCallback" => parse_status(payload),
        other => Inbound::Ignored(IgnoreReason::UnsupportedEvent(if other.is_empty() {
            "unknown".to_string()
        } else {
            other.to_string()
        })),
    }
}

fn flag(payload: &Value, key: &str) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn parse_received(payload: &Value) -> Inbound {
    let phone_raw = payload.get("phone").and_then(Value::as_str).unwrap_or("");

    if flag(payload, "isGroup") || phone_raw.ends_with("-group") || phone_raw.ends_with("@g.us") {
        return Inbound::Ignored(IgnoreReason::Group);
    }
    if flag(payload, "isNewsletter") || phone_raw.ends_with("@newsletter") {
        return Inbound::Ignored(IgnoreReason::Newsletter);
    }
    if flag(payload, "broadcast") || phone_raw.contains("broadcast") {
        return Inbound::Ignored(IgnoreReason::Broadcast);
    }

    let Some(message_id) = str_field(payload, "messageId") else {
        return Inbound::Ignored(IgnoreReason::MissingMessageId);
    };

    let text = payload
        .get("text")
        .and_then(|t| t.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let media = parse_media(payload);
    if text.is_none() && media.is_none() {
        return Inbound::Ignored(IgnoreReason::UnsupportedContent);
    }

    let from_me = flag(payload, "fromMe");
    let counterpart = normalize_phone(phone_raw);
    let connected = payload
        .get("connectedPhone")
        .and_then(Value::as_str)
        .map(normalize_phone)
        .unwrap_or_default();
    let (sender, recipient) = if from_me {
        (connected, counterpart)
    } else {
        (counterpart, connected)
    };

    let sender_name = ["senderName", "chatName"]
        .iter()
        .find_map(|k| str_field(payload, k));

    // `momment` is the provider's spelling; milliseconds since the epoch.
    let timestamp = payload
        .get("momment")
        .and_then(Value::as_i64)
        .map(|ms| ms / 1000);

    Inbound::Message(Box::new(CanonicalMessage {
        provider_message_id: message_id,
        sender,
        recipient,
        body: text,
        media,
        from_me,
        sender_name,
        provider: "zapi".to_string(),
        chat_lid: str_field(payload, "chatLid"),
        instance_id: str_field(payload, "instanceId"),
        timestamp,
        raw: payload.clone(),
    }))
}

fn parse_media(payload: &Value) -> Option<MediaRef> {
    const SHAPES: [(&str, &str, MediaKind); 4] = [
        ("audio", "audioUrl", MediaKind::Audio),
        ("image", "imageUrl", MediaKind::Image),
        ("video", "videoUrl", MediaKind::Video),
        ("document", "documentUrl", MediaKind::Document),
    ];
    SHAPES.iter().find_map(|(key, url_key, kind)| {
        let node = payload.get(*key)?;
        let url = str_field(node, url_key)?;
        Some(MediaRef {
            kind: *kind,
            url,
            mime_type: str_field(node, "mimeType"),
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

fn parse_status(payload: &Value) -> Inbound {
    let raw_status = payload.get("status").and_then(Value::as_str).unwrap_or("");
    let status = match raw_status.to_ascii_uppercase().as_str() {
        "SENT" => DeliveryStatus::Sent,
        "RECEIVED" => DeliveryStatus::Delivered,
        "READ" | "PLAYED" => DeliveryStatus::Read,
        _ => return Inbound::Ignored(IgnoreReason::UntrackedStatus(raw_status.to_string())),
    };

    let mut ids: Vec<String> = payload
        .get("ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if ids.is_empty()
        && let Some(id) = str_field(payload, "messageId")
    {
        ids.push(id);
    }
    if ids.is_empty() {
        return Inbound::Ignored(IgnoreReason::MissingMessageId);
    }

    Inbound::Status(StatusCallback {
        provider_message_ids: ids,
        status,
        provider: "zapi".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ZapiConfig {
        ZapiConfig {
            base_url: base_url.to_string(),
            instance_id: "INST1".into(),
            token: "TOK".into(),
            client_token: Some("client-secret".into()),
            webhook_token: Some("hook-secret".into()),
        }
    }

    fn provider(base_url: &str) -> ZapiProvider {
        ZapiProvider::new(config(base_url), Duration::from_secs(5)).unwrap()
    }

    fn received_text() -> Value {
        json!({
            "type": "ReceivedCallback",
            "instanceId": "INST1",
            "messageId": "MSG123",
            "phone": "5511888888888",
            "connectedPhone": "5511999999999",
            "fromMe": false,
            "isGroup": false,
            "chatLid": "98765@lid",
            "senderName": "Maria",
            "momment": 1_700_000_000_000i64,
            "text": {"message": "Hello"}
        })
    }

    #[test]
    fn parses_inbound_text() {
        let Inbound::Message(msg) = parse_payload(&received_text()) else {
            panic!("expected message");
        };
        assert_eq!(msg.provider_message_id, "MSG123");
        assert_eq!(msg.sender, "5511888888888");
        assert_eq!(msg.recipient, "5511999999999");
        assert_eq!(msg.customer_phone(), "5511888888888");
        assert_eq!(msg.body.as_deref(), Some("Hello"));
        assert_eq!(msg.chat_lid.as_deref(), Some("98765@lid"));
        assert_eq!(msg.instance_id.as_deref(), Some("INST1"));
        assert_eq!(msg.sender_name.as_deref(), Some("Maria"));
        assert_eq!(msg.timestamp, Some(1_700_000_000));
        assert!(!msg.from_me);
    }

    #[test]
    fn from_me_swaps_sender_and_recipient() {
        let mut payload = received_text();
        payload["fromMe"] = json!(true);
        let Inbound::Message(msg) = parse_payload(&payload) else {
            panic!("expected message");
        };
        assert_eq!(msg.sender, "5511999999999");
        assert_eq!(msg.recipient, "5511888888888");
        assert_eq!(msg.customer_phone(), "5511888888888");
    }

    #[test]
    fn parses_voice_note() {
        let payload = json!({
            "type": "ReceivedCallback",
            "messageId": "AUD1",
            "phone": "5511888888888",
            "connectedPhone": "5511999999999",
            "audio": {"audioUrl": "https://cdn.z-api.io/a.ogg", "mimeType": "audio/ogg; codecs=opus", "seconds": 7, "ptt": true}
        });
        let Inbound::Message(msg) = parse_payload(&payload) else {
            panic!("expected message");
        };
        let media = msg.media.as_ref().unwrap();
        assert_eq!(media.kind, MediaKind::Audio);
        assert_eq!(media.duration_secs, Some(7));
        assert!(media.ptt);
        assert_eq!(msg.display_content(), "[audio]");
    }

    #[test]
    fn ignores_groups_newsletters_and_broadcasts() {
        let mut group = received_text();
        group["isGroup"] = json!(true);
        assert_eq!(parse_payload(&group), Inbound::Ignored(IgnoreReason::Group));

        let mut group_phone = received_text();
        group_phone["phone"] = json!("120363019502650977-group");
        assert_eq!(
            parse_payload(&group_phone),
            Inbound::Ignored(IgnoreReason::Group)
        );

        let mut newsletter = received_text();
        newsletter["isNewsletter"] = json!(true);
        assert_eq!(
            parse_payload(&newsletter),
            Inbound::Ignored(IgnoreReason::Newsletter)
        );

        let mut broadcast = received_text();
        broadcast["phone"] = json!("status@broadcast");
        assert_eq!(
            parse_payload(&broadcast),
            Inbound::Ignored(IgnoreReason::Broadcast)
        );
    }

    #[test]
    fn ignores_missing_id_unsupported_content_and_events() {
        let mut no_id = received_text();
        no_id.as_object_mut().unwrap().remove("messageId");
        assert_eq!(
            parse_payload(&no_id),
            Inbound::Ignored(IgnoreReason::MissingMessageId)
        );

        let mut reaction = received_text();
        reaction.as_object_mut().unwrap().remove("text");
        reaction["reaction"] = json!({"value": "👍"});
        assert_eq!(
            parse_payload(&reaction),
            Inbound::Ignored(IgnoreReason::UnsupportedContent)
        );

        assert_eq!(
            parse_payload(&json!({"type": "PresenceChatCallback"})),
            Inbound::Ignored(IgnoreReason::UnsupportedEvent(
                "PresenceChatCallback".into()
            ))
        );
    }

    #[test]
    fn parses_status_callbacks() {
        let payload = json!({
            "type": "MessageStatusCallback",
            "status": "READ",
            "ids": ["A", "B"],
            "instanceId": "INST1"
        });
        assert_eq!(
            parse_payload(&payload),
            Inbound::Status(StatusCallback {
                provider_message_ids: vec!["A".into(), "B".into()],
                status: DeliveryStatus::Read,
                provider: "zapi".into(),
            })
        );

        let received = json!({"type": "MessageStatusCallback", "status": "RECEIVED", "ids": ["A"]});
        let Inbound::Status(cb) = parse_payload(&received) else {
            panic!("expected status");
        };
        assert_eq!(cb.status, DeliveryStatus::Delivered);

        let odd = json!({"type": "MessageStatusCallback", "status": "READ_BY_ME", "ids": ["A"]});
        assert_eq!(
            parse_payload(&odd),
            Inbound::Ignored(IgnoreReason::UntrackedStatus("READ_BY_ME".into()))
        );
    }

    #[test]
    fn validate_webhook_requires_matching_client_token() {
        let p = provider("http://localhost");
        let payload = received_text();
        assert!(p.validate_webhook(&payload, Some("hook-secret")));
        assert!(!p.validate_webhook(&payload, Some("wrong")));
        assert!(!p.validate_webhook(&payload, None));
        assert_eq!(p.auth_header(), Some("Client-Token"));

        let mut cfg = config("http://localhost");
        cfg.webhook_token = None;
        let open = ZapiProvider::new(cfg, Duration::from_secs(5)).unwrap();
        assert!(!open.validate_webhook(&payload, Some("hook-secret")));
    }

    #[test]
    fn document_extension_prefers_file_name() {
        assert_eq!(document_extension("Report.PDF", None), "pdf");
        assert_eq!(document_extension("report", Some("application/pdf")), "pdf");
        assert_eq!(document_extension("report", None), "bin");
    }

    #[tokio::test]
    async fn send_text_posts_to_instance_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/INST1/token/TOK/send-text"))
            .and(header("Client-Token", "client-secret"))
            .and(body_json(json!({"phone": "5511888888888", "message": "Hi"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"zaapId": "Z1", "messageId": "OUT1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server.uri())
            .send_text("5511888888888@s.whatsapp.net", "Hi")
            .await;
        assert!(result.success);
        assert_eq!(result.provider_message_id.as_deref(), Some("OUT1"));
    }

    #[tokio::test]
    async fn send_media_routes_by_extension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/INST1/token/TOK/send-audio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageId": "AUD"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/instances/INST1/token/TOK/send-document/pdf"))
            .and(body_json(json!({
                "phone": "5511888888888",
                "document": "https://files.example/r.pdf",
                "fileName": "r.pdf"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageId": "DOC"})))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let audio = p
            .send_media("5511888888888", "https://files.example/v.ogg", None)
            .await;
        assert_eq!(audio.provider_message_id.as_deref(), Some("AUD"));

        let doc = p
            .send_document("5511888888888", "https://files.example/r.pdf", "r.pdf", None)
            .await;
        assert_eq!(doc.provider_message_id.as_deref(), Some("DOC"));
    }

    #[tokio::test]
    async fn server_errors_are_retryable_client_errors_are_not() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/INST1/token/TOK/send-text"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/instances/INST1/token/TOK/send-image"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad phone"))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let unavailable = p.send_text("5511888888888", "Hi").await;
        assert!(!unavailable.success);
        assert!(unavailable.retryable);

        let rejected = p
            .send_media("5511888888888", "https://files.example/p.png", Some("look"))
            .await;
        assert!(!rejected.success);
        assert!(!rejected.retryable);
        assert!(rejected.error.unwrap().contains("bad phone"));
    }

    #[tokio::test]
    async fn connection_refused_is_retryable() {
        let p = provider("http://127.0.0.1:9");
        let result = p.send_text("5511888888888", "Hi").await;
        assert!(!result.success);
        assert!(result.retryable);
    }
}
