// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook handling: authenticate, normalize, route, persist.

use std::sync::Arc;

use relaydesk_core::types::{
    CanonicalMessage, DeliveryStatus, Direction, IgnoreReason, Inbound, InsertOutcome,
    MediaRecord, MediaStatus, Message, SenderType,
};
use relaydesk_core::{MessagingProvider, PluginAdapter, RelaydeskError, StorageAdapter};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::media::MediaQueue;
use crate::resolver::{Resolution, Resolver};
use crate::status::{StatusReport, StatusTracker};

pub use relaydesk_core::types::PHONE_SENDER_ID;

/// What happened to one webhook.
///
/// Everything except [`Rejected`](Self::Rejected) is acknowledged with 200:
/// a provider retry would not change the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Authenticity check failed.
    Rejected,
    Ignored {
        reason: String,
    },
    /// A delivery callback was applied.
    StatusApplied {
        #[serde(flatten)]
        report: StatusReport,
    },
    /// A from-me message this system already stored when sending it.
    Echo {
        message_id: String,
    },
    Stored {
        message_id: String,
        conversation_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_id: Option<String>,
    },
    /// The provider message id was already stored.
    Duplicate {
        external_id: String,
    },
    /// No tenant or customer could be determined.
    Unroutable {
        reason: String,
    },
    /// An internal error; acknowledged so the provider does not retry.
    Failed {
        error: String,
    },
}

impl WebhookOutcome {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Rejected => "rejected",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::StatusApplied { .. } => "status",
            WebhookOutcome::Echo { .. } => "echo",
            WebhookOutcome::Stored { .. } => "stored",
            WebhookOutcome::Duplicate { .. } => "duplicate",
            WebhookOutcome::Unroutable { .. } => "unroutable",
            WebhookOutcome::Failed { .. } => "failed",
        }
    }

    fn ignored(reason: IgnoreReason) -> Self {
        WebhookOutcome::Ignored {
            reason: reason.to_string(),
        }
    }
}

/// The inbound webhook pipeline.
///
/// Performs no outbound network I/O: media downloads are only queued.
#[derive(Clone)]
pub struct WebhookPipeline {
    storage: Arc<dyn StorageAdapter>,
    resolver: Resolver,
    status: StatusTracker,
    media: MediaQueue,
}

impl WebhookPipeline {
    pub fn new(storage: Arc<dyn StorageAdapter>, media: MediaQueue) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&storage)),
            status: StatusTracker::new(Arc::clone(&storage)),
            storage,
            media,
        }
    }

    /// Handles one webhook for `provider`.
    ///
    /// `auth_header` is the value of the provider's
    /// [`auth_header`](MessagingProvider::auth_header), if it names one.
    pub async fn handle(
        &self,
        provider: &dyn MessagingProvider,
        payload: &serde_json::Value,
        auth_header: Option<&str>,
    ) -> WebhookOutcome {
        let outcome = if !provider.validate_webhook(payload, auth_header) {
            warn!(provider = provider.name(), "webhook failed authentication");
            WebhookOutcome::Rejected
        } else {
            match self.process(provider, payload).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(provider = provider.name(), error = %e, "webhook processing failed");
                    WebhookOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };
        relaydesk_prometheus::record_webhook(provider.name(), outcome.label());
        outcome
    }

    async fn process(
        &self,
        provider: &dyn MessagingProvider,
        payload: &serde_json::Value,
    ) -> Result<WebhookOutcome, RelaydeskError> {
        match provider.parse_incoming(payload) {
            Inbound::Ignored(reason) => {
                debug!(provider = provider.name(), %reason, "webhook ignored");
                Ok(WebhookOutcome::ignored(reason))
            }
            Inbound::Status(callback) => {
                let report = self.status.apply(&callback).await?;
                Ok(WebhookOutcome::StatusApplied { report })
            }
            Inbound::Message(msg) => self.ingest(&msg).await,
        }
    }

    /// Persists one canonical message.
    pub async fn ingest(&self, msg: &CanonicalMessage) -> Result<WebhookOutcome, RelaydeskError> {
        if msg.from_me
            && let Some(existing) = self
                .storage
                .find_message_by_external_id(&msg.provider_message_id)
                .await?
        {
            debug!(external_id = %msg.provider_message_id, "echo of a stored message");
            return Ok(WebhookOutcome::Echo {
                message_id: existing.id,
            });
        }

        let thread = match self.resolver.resolve(msg).await? {
            Resolution::Resolved(thread) => thread,
            Resolution::Blocked {
                company_id,
                customer_id,
            } => {
                info!(company = %company_id, customer = %customer_id, "message from blocked customer ignored");
                return Ok(WebhookOutcome::ignored(IgnoreReason::BlockedCustomer));
            }
            Resolution::Unroutable(reason) => {
                error!(
                    provider = %msg.provider,
                    external_id = %msg.provider_message_id,
                    reason = %reason,
                    "unroutable inbound event"
                );
                relaydesk_prometheus::record_unroutable();
                return Ok(WebhookOutcome::Unroutable { reason });
            }
        };

        let now = crate::now_timestamp();
        let message_id = uuid::Uuid::new_v4().to_string();
        let (sender_type, sender_id, status) = if msg.from_me {
            (SenderType::Agent, PHONE_SENDER_ID.to_string(), DeliveryStatus::Sent)
        } else {
            (
                SenderType::Customer,
                thread.customer.id.clone(),
                DeliveryStatus::Received,
            )
        };
        let media = msg.media.as_ref().map(|media| MediaRecord {
            id: uuid::Uuid::new_v4().to_string(),
            provider_message_id: msg.provider_message_id.clone(),
            message_id: Some(message_id.clone()),
            company_id: thread.company_id.clone(),
            direction: if msg.from_me {
                Direction::Outbound
            } else {
                Direction::Inbound
            },
            kind: media.kind,
            source_url: media.url.clone(),
            file_path: None,
            mime_type: media.mime_type.clone(),
            duration_secs: media.duration_secs,
            size_bytes: None,
            status: MediaStatus::Received,
            error_message: None,
            replay_count: 0,
            created_at: now.clone(),
            updated_at: now.clone(),
            completed_at: None,
        });
        let message = Message {
            id: message_id,
            conversation_id: thread.conversation.id.clone(),
            company_id: thread.company_id.clone(),
            content: msg.display_content(),
            sender_type,
            sender_id,
            message_type: msg.message_type(),
            external_message_id: Some(msg.provider_message_id.clone()),
            status,
            ai_metadata: None,
            media_id: media.as_ref().map(|m| m.id.clone()),
            media_path: None,
            created_at: now.clone(),
            updated_at: now,
        };

        match self.storage.insert_message(&message, media.as_ref()).await? {
            InsertOutcome::Duplicate => {
                debug!(external_id = %msg.provider_message_id, "duplicate webhook");
                Ok(WebhookOutcome::Duplicate {
                    external_id: msg.provider_message_id.clone(),
                })
            }
            InsertOutcome::Inserted => {
                if let Some(media) = &media {
                    self.media.enqueue(&media.id);
                }
                info!(
                    company = %thread.company_id,
                    conversation = %thread.conversation.id,
                    message = %message.id,
                    via_chat_lid = thread.via_chat_lid,
                    kind = %message.message_type,
                    "message stored"
                );
                Ok(WebhookOutcome::Stored {
                    message_id: message.id,
                    conversation_id: message.conversation_id,
                    media_id: message.media_id,
                })
            }
        }
    }
}
