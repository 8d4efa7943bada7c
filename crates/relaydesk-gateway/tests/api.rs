// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests: status codes, authentication and JSON bodies.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use relaydesk_config::model::ServerConfig;
use relaydesk_gateway::{AuthConfig, GatewayState, HealthState, build_router};
use relaydesk_test_utils::{TestHarness, WEBHOOK_TOKEN};
use serde_json::{Value, json};
use tower::ServiceExt;

const API_TOKEN: &str = "operator-token";

fn router(harness: &TestHarness, prometheus: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Router {
    let state = GatewayState {
        storage: Arc::clone(&harness.storage),
        registry: Arc::clone(&harness.registry),
        pipeline: harness.pipeline.clone(),
        outbound: harness.outbound.clone(),
        media: harness.media.clone(),
        auth: AuthConfig {
            bearer_token: Some(API_TOKEN.to_string()),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: prometheus,
        },
    };
    build_router(&ServerConfig::default(), state)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn api(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {API_TOKEN}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn zapi_webhook(uri: &str, token: Option<&str>, payload: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Client-Token", token);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

fn zapi_text(message_id: &str) -> Value {
    json!({
        "type": "ReceivedCallback",
        "instanceId": "ACME-ZAPI",
        "messageId": message_id,
        "phone": "5511888888888",
        "connectedPhone": "5511999999999",
        "fromMe": false,
        "text": {"message": "Hello"},
    })
}

// ---- Webhooks ----

#[tokio::test]
async fn test_webhook_is_acknowledged_with_outcome() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, body) = call(
        &app,
        zapi_webhook("/webhooks/zapi", Some(WEBHOOK_TOKEN), &zapi_text("W1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stored");

    let (status, body) = call(
        &app,
        zapi_webhook("/webhooks/zapi", Some(WEBHOOK_TOKEN), &zapi_text("W1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
}

#[tokio::test]
async fn test_webhook_with_bad_token_is_unauthorized() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, _) = call(&app, zapi_webhook("/webhooks/zapi", None, &zapi_text("W2"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(
        &app,
        zapi_webhook("/webhooks/zapi", Some("wrong"), &zapi_text("W2")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(
        harness
            .storage
            .find_message_by_external_id("W2")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_provider_route_is_not_found() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, body) = call(
        &app,
        zapi_webhook("/webhooks/twilio", Some(WEBHOOK_TOKEN), &zapi_text("W3")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("twilio"));
}

#[tokio::test]
async fn test_ignored_group_message_is_acknowledged() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let mut payload = zapi_text("G1");
    payload["isGroup"] = json!(true);
    payload["phone"] = json!("120363019999999999-group");
    let (status, body) = call(
        &app,
        zapi_webhook("/webhooks/zapi", Some(WEBHOOK_TOKEN), &payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn test_generic_webhook_follows_provider_switch() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, _) = call(
        &app,
        zapi_webhook("/webhooks", Some(WEBHOOK_TOKEN), &zapi_text("A1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        api("PUT", "/v1/providers/current", Some(json!({"name": "evolution"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"], "evolution");

    let evolution = json!({
        "event": "messages.upsert",
        "instance": "acme-main",
        "apikey": WEBHOOK_TOKEN,
        "sender": "5511999999999@s.whatsapp.net",
        "data": {
            "key": {"remoteJid": "5511888888888@s.whatsapp.net", "fromMe": false, "id": "EVO-A2"},
            "message": {"conversation": "via evolution"},
        },
    });
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("content-type", "application/json")
        .body(Body::from(evolution.to_string()))
        .unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stored");
}

// ---- Operator API ----

#[tokio::test]
async fn test_operator_api_requires_bearer_token() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let request = Request::builder()
        .uri("/v1/providers")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, api("GET", "/v1/providers", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"current": "zapi", "available": ["evolution", "zapi"]}));
}

#[tokio::test]
async fn test_switch_to_unknown_provider_is_not_found() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, _) = call(
        &app,
        api("PUT", "/v1/providers/current", Some(json!({"name": "nope"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(harness.registry.current_name(), "zapi");
}

#[tokio::test]
async fn test_send_text_returns_receipt() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, body) = call(
        &app,
        api(
            "POST",
            "/v1/companies/acme/messages/text",
            Some(json!({"to": "5511888888888", "body": "Hi there", "agent_id": "agent-1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["provider"], "zapi");
    assert_eq!(body["provider_message_id"], "MOCK-1");
    assert_eq!(harness.zapi.sent().await[0].payload, "Hi there");
}

#[tokio::test]
async fn test_send_validation_errors_are_bad_requests() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, _) = call(
        &app,
        api(
            "POST",
            "/v1/companies/acme/messages/text",
            Some(json!({"to": "5511888888888", "body": "   "})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        api(
            "POST",
            "/v1/companies/acme/messages/media",
            Some(json!({"to": "no digits", "url": "https://cdn.example/a.jpg"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.zapi.sent().await.is_empty());
}

#[tokio::test]
async fn test_send_for_unknown_company_is_not_found() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, _) = call(
        &app,
        api(
            "POST",
            "/v1/companies/initech/messages/text",
            Some(json!({"to": "5511888888888", "body": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_campaign_send_and_conversation_stats() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let (status, receipt) = call(
        &app,
        api(
            "POST",
            "/v1/companies/acme/campaigns/spring/send",
            Some(json!({
                "to": "5511888888888",
                "content": {"type": "document", "url": "https://cdn.example/catalog.pdf", "file_name": "catalog.pdf"},
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id = receipt["conversation_id"].as_str().unwrap().to_string();
    assert_eq!(harness.zapi.sent().await[0].kind, "document");

    let (status, stats) = call(
        &app,
        api(
            "GET",
            &format!("/v1/companies/acme/conversations/{conversation_id}/stats"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["from_system"], 1);

    // Same conversation id under another tenant.
    let (status, _) = call(
        &app,
        api(
            "GET",
            &format!("/v1/companies/globex/conversations/{conversation_id}/stats"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_media_operator_endpoints() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let mut payload = zapi_text("MEDIA1");
    payload.as_object_mut().unwrap().remove("text");
    payload["audio"] = json!({"audioUrl": "https://cdn.example/voice.ogg", "mimeType": "audio/ogg; codecs=opus", "ptt": true});
    let (_, outcome) = call(
        &app,
        zapi_webhook("/webhooks/zapi", Some(WEBHOOK_TOKEN), &payload),
    )
    .await;
    let media_id = outcome["media_id"].as_str().unwrap().to_string();

    let (status, record) = call(&app, api("GET", &format!("/v1/media/{media_id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "received");
    assert_eq!(record["kind"], "audio");

    let (status, list) = call(&app, api("GET", "/v1/media?status=received", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["media"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, api("GET", "/v1/media?status=lost", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Replay is only allowed from `failed`.
    let (status, _) = call(
        &app,
        api("POST", &format!("/v1/media/{media_id}/replay"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, record) = call(
        &app,
        api(
            "POST",
            &format!("/v1/media/{media_id}/fail"),
            Some(json!({"reason": "link expired"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "failed");
    assert_eq!(record["error_message"], "link expired");

    let (status, record) = call(
        &app,
        api(
            "POST",
            &format!("/v1/media/{media_id}/replay"),
            Some(json!({"source_url": "https://cdn.example/voice-2.ogg"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "received");
    assert_eq!(record["replay_count"], 1);
    assert_eq!(record["source_url"], "https://cdn.example/voice-2.ogg");

    let (status, stats) = call(&app, api("GET", "/v1/stats/media", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["received"], 1);
    assert_eq!(stats["total"], 1);

    let (status, _) = call(&app, api("GET", "/v1/media/does-not-exist", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---- Public endpoints ----

#[tokio::test]
async fn test_health_is_public() {
    let harness = TestHarness::new().await.unwrap();
    let app = router(&harness, None);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "zapi");
}

#[tokio::test]
async fn test_metrics_served_when_enabled() {
    let harness = TestHarness::new().await.unwrap();

    let disabled = router(&harness, None);
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = disabled.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let enabled = router(
        &harness,
        Some(Arc::new(|| "relaydesk_webhooks_total 1\n".to_string())),
    );
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = enabled.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("relaydesk_webhooks_total"));
}
