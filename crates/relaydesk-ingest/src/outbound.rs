// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound sends through the active provider.
//!
//! A send is persisted as a `pending` message before the provider is called,
//! then marked `sent` (with the provider's message id) or `failed`. Later
//! delivery callbacks find the message by that id.

use std::sync::Arc;

use relaydesk_core::types::{
    DeliveryStatus, InsertOutcome, MediaKind, Message, MessageType, SendResult, SenderType,
    mime_for_path, normalize_phone,
};
use relaydesk_core::{MessagingProvider, PluginAdapter, RelaydeskError, StorageAdapter};
use relaydesk_whatsapp::{ProviderRegistry, RetryPolicy, send_with_retry};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundContent {
    Text {
        body: String,
    },
    /// Image, audio or video hosted at a URL.
    Media {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Document {
        url: String,
        file_name: String,
        #[serde(default)]
        caption: Option<String>,
    },
    /// A file supplied inline as base64.
    File {
        base64: String,
        mime_type: String,
        file_name: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl OutboundContent {
    fn message_type(&self) -> MessageType {
        match self {
            OutboundContent::Text { .. } => MessageType::Text,
            OutboundContent::Media { url, .. } => mime_for_path(url)
                .map(|m| MessageType::from(MediaKind::from_mime(m)))
                .unwrap_or(MessageType::Image),
            OutboundContent::Document { .. } => MessageType::Document,
            OutboundContent::File { mime_type, .. } => {
                MessageType::from(MediaKind::from_mime(mime_type))
            }
        }
    }

    /// Text stored as the message content.
    fn display_content(&self) -> String {
        let placeholder = |caption: &Option<String>, label: String| {
            caption
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or(label)
        };
        match self {
            OutboundContent::Text { body } => body.clone(),
            OutboundContent::Media { caption, .. } => {
                placeholder(caption, format!("[{}]", self.message_type()))
            }
            OutboundContent::Document {
                caption, file_name, ..
            }
            | OutboundContent::File {
                caption, file_name, ..
            } => placeholder(caption, format!("[{}: {file_name}]", self.message_type())),
        }
    }

    /// Checks the fields a provider would reject anyway.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            OutboundContent::Text { body } if body.trim().is_empty() => {
                Err("text body must not be empty".into())
            }
            OutboundContent::Media { url, .. } | OutboundContent::Document { url, .. }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Err("url must be http(s)".into())
            }
            OutboundContent::Document { file_name, .. } if file_name.trim().is_empty() => {
                Err("file_name must not be empty".into())
            }
            OutboundContent::File {
                base64, mime_type, ..
            } if base64.is_empty() || mime_type.is_empty() => {
                Err("base64 and mime_type must not be empty".into())
            }
            _ => Ok(()),
        }
    }
}

/// One outbound message to a customer of a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Customer phone or JID.
    pub to: String,
    pub content: OutboundContent,
    /// Agent user id recorded as the sender; `system` when absent.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Metadata of an AI-generated reply, stored verbatim.
    #[serde(default)]
    pub ai_metadata: Option<serde_json::Value>,
}

impl OutboundRequest {
    pub fn validate(&self) -> Result<(), String> {
        if normalize_phone(&self.to).is_empty() {
            return Err("to must contain a phone number".into());
        }
        self.content.validate()
    }
}

/// Result of an outbound send, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundReceipt {
    pub message_id: String,
    pub conversation_id: String,
    pub provider: String,
    #[serde(flatten)]
    pub result: SendResult,
}

/// Sends messages through the registry's active provider.
#[derive(Clone)]
pub struct OutboundService {
    storage: Arc<dyn StorageAdapter>,
    registry: Arc<ProviderRegistry>,
    retry: RetryPolicy,
}

impl OutboundService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        registry: Arc<ProviderRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            registry,
            retry,
        }
    }

    /// Sends a message in the customer's open conversation, opening one if
    /// needed.
    pub async fn send(
        &self,
        company_id: &str,
        request: &OutboundRequest,
    ) -> Result<OutboundReceipt, RelaydeskError> {
        self.deliver(company_id, None, request).await
    }

    /// Sends a campaign message. A conversation opened by this send carries
    /// the campaign id, so the customer's reply is bound to it.
    pub async fn send_campaign(
        &self,
        company_id: &str,
        campaign_id: &str,
        request: &OutboundRequest,
    ) -> Result<OutboundReceipt, RelaydeskError> {
        self.deliver(company_id, Some(campaign_id), request).await
    }

    async fn deliver(
        &self,
        company_id: &str,
        campaign_id: Option<&str>,
        request: &OutboundRequest,
    ) -> Result<OutboundReceipt, RelaydeskError> {
        if self.storage.get_company(company_id).await?.is_none() {
            return Err(RelaydeskError::not_found("company", company_id));
        }
        let provider = self.registry.current();
        let phone = normalize_phone(&request.to);

        let customer = self
            .storage
            .get_or_create_customer(company_id, &phone, None)
            .await?;
        let (conversation, created) = self
            .storage
            .get_or_create_open_conversation(company_id, &customer.id, provider.name(), campaign_id)
            .await?;
        if created {
            info!(
                company = company_id,
                conversation = %conversation.id,
                campaign = campaign_id.unwrap_or("-"),
                "opened conversation for outbound send"
            );
        }

        let (sender_type, sender_id) = match (&request.agent_id, campaign_id) {
            (Some(agent), _) => (SenderType::Agent, agent.clone()),
            (None, Some(_)) => (SenderType::System, "campaign".to_string()),
            (None, None) => (SenderType::System, "system".to_string()),
        };
        let now = crate::now_timestamp();
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            company_id: company_id.to_string(),
            content: request.content.display_content(),
            sender_type,
            sender_id,
            message_type: request.content.message_type(),
            external_message_id: None,
            status: DeliveryStatus::Pending,
            ai_metadata: request.ai_metadata.as_ref().map(|m| m.to_string()),
            media_id: None,
            media_path: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.storage.insert_message(&message, None).await?;

        let result = send_with_retry(self.retry, || {
            dispatch(provider.as_ref(), &phone, &request.content)
        })
        .await;
        relaydesk_prometheus::record_send(provider.name(), result.success);

        let status = if result.success {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        };
        let outcome = self
            .storage
            .mark_message_sent(&message.id, result.provider_message_id.as_deref(), status)
            .await?;
        if outcome == InsertOutcome::Duplicate {
            warn!(
                message = %message.id,
                external_id = result.provider_message_id.as_deref().unwrap_or(""),
                "provider id already attached to another message"
            );
        }
        if !result.success {
            warn!(
                provider = provider.name(),
                message = %message.id,
                error = result.error.as_deref().unwrap_or(""),
                "outbound send failed"
            );
        }

        Ok(OutboundReceipt {
            message_id: message.id,
            conversation_id: conversation.id,
            provider: provider.name().to_string(),
            result,
        })
    }
}

async fn dispatch(provider: &dyn MessagingProvider, to: &str, content: &OutboundContent) -> SendResult {
    match content {
        OutboundContent::Text { body } => provider.send_text(to, body).await,
        OutboundContent::Media { url, caption } => {
            provider.send_media(to, url, caption.as_deref()).await
        }
        OutboundContent::Document {
            url,
            file_name,
            caption,
        } => {
            provider
                .send_document(to, url, file_name, caption.as_deref())
                .await
        }
        OutboundContent::File {
            base64,
            mime_type,
            file_name,
            caption,
        } => {
            provider
                .send_file_base64(to, base64, mime_type, file_name, caption.as_deref())
                .await
        }
    }
}
