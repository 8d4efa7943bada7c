// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound sends, echoes and delivery status callbacks.

use std::time::Duration;

use proptest::prelude::*;
use relaydesk_core::StorageAdapter;
use relaydesk_core::types::{DeliveryStatus, SendResult, SenderType, StatusCallback};
use relaydesk_ingest::{OutboundContent, OutboundRequest, StatusReport, StatusTracker, WebhookOutcome};
use relaydesk_test_utils::TestHarness;
use relaydesk_whatsapp::RetryPolicy;
use serde_json::json;

fn text_to(to: &str, body: &str) -> OutboundRequest {
    OutboundRequest {
        to: to.to_string(),
        content: OutboundContent::Text { body: body.to_string() },
        agent_id: Some("agent-7".to_string()),
        ai_metadata: None,
    }
}

fn zapi_status(status: &str, ids: &[&str]) -> serde_json::Value {
    json!({
        "type": "MessageStatusCallback",
        "instanceId": "ACME-ZAPI",
        "status": status,
        "ids": ids,
    })
}

// ---- Outbound sends ----

#[tokio::test]
async fn test_send_persists_message_with_provider_id() {
    let harness = TestHarness::new().await.unwrap();

    let receipt = harness
        .outbound
        .send("acme", &text_to("+55 11 88888-8888", "Your order shipped"))
        .await
        .unwrap();
    assert!(receipt.result.success);
    assert_eq!(receipt.provider, "zapi");
    assert_eq!(receipt.result.provider_message_id.as_deref(), Some("MOCK-1"));

    let sent = harness.zapi.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "5511888888888");
    assert_eq!(sent[0].payload, "Your order shipped");

    let message = harness
        .storage
        .find_message_by_external_id("MOCK-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.id, receipt.message_id);
    assert_eq!(message.status, DeliveryStatus::Sent);
    assert_eq!(message.sender_type, SenderType::Agent);
    assert_eq!(message.sender_id, "agent-7");
}

#[tokio::test]
async fn test_failed_send_is_recorded_as_failed() {
    let harness = TestHarness::new().await.unwrap();
    harness
        .zapi
        .push_result(SendResult::failed("invalid phone", false))
        .await;

    let receipt = harness
        .outbound
        .send("acme", &text_to("5511000000000", "hi"))
        .await
        .unwrap();
    assert!(!receipt.result.success);

    let messages = harness
        .storage
        .get_messages("acme", &receipt.conversation_id, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert_eq!(messages[0].external_message_id, None);
}

#[tokio::test]
async fn test_retryable_failure_is_retried() {
    let harness = TestHarness::builder()
        .with_retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        })
        .build()
        .await
        .unwrap();
    harness
        .zapi
        .push_result(SendResult::failed("503 Service Unavailable", true))
        .await;

    let receipt = harness
        .outbound
        .send("acme", &text_to("5511888888888", "retry me"))
        .await
        .unwrap();
    assert!(receipt.result.success);
    assert_eq!(harness.zapi.sent().await.len(), 2);
}

#[tokio::test]
async fn test_send_uses_the_active_provider() {
    let harness = TestHarness::new().await.unwrap();
    harness.registry.switch("evolution").unwrap();

    let receipt = harness
        .outbound
        .send("acme", &text_to("5511888888888", "via evolution"))
        .await
        .unwrap();
    assert_eq!(receipt.provider, "evolution");
    assert!(harness.zapi.sent().await.is_empty());
    assert_eq!(harness.evolution.sent().await.len(), 1);
}

#[tokio::test]
async fn test_echo_of_sent_message_is_not_stored_twice() {
    let harness = TestHarness::new().await.unwrap();
    let receipt = harness
        .outbound
        .send("acme", &text_to("5511888888888", "hello"))
        .await
        .unwrap();

    let echo = json!({
        "type": "ReceivedCallback",
        "instanceId": "ACME-ZAPI",
        "messageId": "MOCK-1",
        "phone": "5511888888888",
        "connectedPhone": "5511999999999",
        "fromMe": true,
        "text": {"message": "hello"},
    });
    let outcome = harness.webhook("zapi", echo).await;
    assert_eq!(
        outcome,
        WebhookOutcome::Echo {
            message_id: receipt.message_id.clone()
        }
    );

    let messages = harness
        .storage
        .get_messages("acme", &receipt.conversation_id, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_echo_arriving_before_send_returns_is_folded_into_send() {
    let harness = TestHarness::new().await.unwrap();

    let echo = json!({
        "type": "ReceivedCallback",
        "instanceId": "ACME-ZAPI",
        "messageId": "MOCK-1",
        "phone": "5511888888888",
        "connectedPhone": "5511999999999",
        "fromMe": true,
        "text": {"message": "hello"},
    });
    let outcome = harness.webhook("zapi", echo).await;
    assert!(matches!(outcome, WebhookOutcome::Stored { .. }), "got {outcome:?}");
    let outcome = harness.webhook("zapi", zapi_status("READ", &["MOCK-1"])).await;
    assert!(matches!(outcome, WebhookOutcome::StatusApplied { .. }), "got {outcome:?}");

    let receipt = harness
        .outbound
        .send("acme", &text_to("5511888888888", "hello"))
        .await
        .unwrap();
    assert!(receipt.result.success);

    let messages = harness
        .storage
        .get_messages("acme", &receipt.conversation_id, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, receipt.message_id);
    assert_eq!(messages[0].sender_id, "agent-7");
    assert_eq!(messages[0].external_message_id.as_deref(), Some("MOCK-1"));
    assert_eq!(messages[0].status, DeliveryStatus::Read);

    let stored = harness
        .storage
        .find_message_by_external_id("MOCK-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, receipt.message_id);
}

// ---- Campaigns ----

#[tokio::test]
async fn test_campaign_reply_binds_chat_lid_to_campaign_conversation() {
    let harness = TestHarness::new().await.unwrap();

    let request = OutboundRequest {
        agent_id: None,
        ..text_to("5511888888888", "Black Friday starts now")
    };
    let receipt = harness
        .outbound
        .send_campaign("acme", "bf-2026", &request)
        .await
        .unwrap();

    let campaign_message = harness
        .storage
        .get_messages("acme", &receipt.conversation_id, None)
        .await
        .unwrap();
    assert_eq!(campaign_message[0].sender_type, SenderType::System);
    assert_eq!(campaign_message[0].sender_id, "campaign");

    let reply = json!({
        "type": "ReceivedCallback",
        "instanceId": "ACME-ZAPI",
        "messageId": "R1",
        "phone": "5511888888888",
        "connectedPhone": "5511999999999",
        "chatLid": "999@lid",
        "fromMe": false,
        "text": {"message": "I want it"},
    });
    let outcome = harness.webhook("zapi", reply).await;
    let WebhookOutcome::Stored {
        conversation_id, ..
    } = outcome
    else {
        panic!("expected stored, got {outcome:?}");
    };
    assert_eq!(conversation_id, receipt.conversation_id);

    let mapping = harness.storage.find_chat_lid("999@lid").await.unwrap().unwrap();
    assert!(mapping.from_campaign);
    assert_eq!(mapping.campaign_id.as_deref(), Some("bf-2026"));
    assert_eq!(mapping.conversation_id, receipt.conversation_id);
}

// ---- Delivery status ----

#[tokio::test]
async fn test_status_only_moves_forward() {
    let harness = TestHarness::new().await.unwrap();
    harness
        .outbound
        .send("acme", &text_to("5511888888888", "status me"))
        .await
        .unwrap();

    let read = harness.webhook("zapi", zapi_status("READ", &["MOCK-1"])).await;
    assert_eq!(
        read,
        WebhookOutcome::StatusApplied {
            report: StatusReport {
                applied: 1,
                unchanged: 0,
                unknown: 0
            }
        }
    );

    // A late delivery ack must not move `read` back.
    let late = harness
        .webhook("zapi", zapi_status("RECEIVED", &["MOCK-1", "NOPE"]))
        .await;
    assert_eq!(
        late,
        WebhookOutcome::StatusApplied {
            report: StatusReport {
                applied: 0,
                unchanged: 1,
                unknown: 1
            }
        }
    );

    let message = harness
        .storage
        .find_message_by_external_id("MOCK-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, DeliveryStatus::Read);
}

#[tokio::test]
async fn test_evolution_ack_batch_is_applied() {
    let harness = TestHarness::builder()
        .with_active_provider("evolution")
        .build()
        .await
        .unwrap();
    for body in ["one", "two"] {
        harness
            .outbound
            .send("acme", &text_to("5511888888888", body))
            .await
            .unwrap();
    }

    let update = json!({
        "event": "messages.update",
        "instance": "acme-main",
        "data": [
            {"keyId": "MOCK-1", "remoteJid": "5511888888888@s.whatsapp.net", "status": "DELIVERY_ACK"},
            {"keyId": "MOCK-2", "remoteJid": "5511888888888@s.whatsapp.net", "status": "DELIVERY_ACK"},
        ],
    });
    let outcome = harness.webhook("evolution", update).await;
    assert_eq!(
        outcome,
        WebhookOutcome::StatusApplied {
            report: StatusReport {
                applied: 2,
                unchanged: 0,
                unknown: 0
            }
        }
    );
}

#[tokio::test]
async fn test_status_callback_never_touches_inbound_messages() {
    let harness = TestHarness::new().await.unwrap();
    let inbound = json!({
        "type": "ReceivedCallback",
        "instanceId": "ACME-ZAPI",
        "messageId": "IN1",
        "phone": "5511888888888",
        "connectedPhone": "5511999999999",
        "fromMe": false,
        "text": {"message": "hi"},
    });
    harness.webhook("zapi", inbound).await;
    harness.webhook("zapi", zapi_status("READ", &["IN1"])).await;

    let message = harness
        .storage
        .find_message_by_external_id("IN1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, DeliveryStatus::Received);
}

fn ladder_status() -> impl Strategy<Value = DeliveryStatus> {
    prop_oneof![
        Just(DeliveryStatus::Sent),
        Just(DeliveryStatus::Delivered),
        Just(DeliveryStatus::Read),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_final_status_is_highest_seen(callbacks in prop::collection::vec(ladder_status(), 1..8)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let final_status = rt.block_on(async {
            let harness = TestHarness::new().await.unwrap();
            harness
                .outbound
                .send("acme", &text_to("5511888888888", "prop"))
                .await
                .unwrap();
            let tracker = StatusTracker::new(harness.storage.clone());
            for status in &callbacks {
                tracker
                    .apply(&StatusCallback {
                        provider_message_ids: vec!["MOCK-1".to_string()],
                        status: *status,
                        provider: "zapi".to_string(),
                    })
                    .await
                    .unwrap();
            }
            harness
                .storage
                .find_message_by_external_id("MOCK-1")
                .await
                .unwrap()
                .unwrap()
                .status
        });

        let expected = callbacks
            .iter()
            .copied()
            .max_by_key(|s| s.rank())
            .unwrap_or(DeliveryStatus::Sent);
        prop_assert_eq!(final_status, expected);
    }
}
