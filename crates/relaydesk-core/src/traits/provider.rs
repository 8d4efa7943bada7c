// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider trait for external chat channels (Z-API, Evolution API).

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{Inbound, SendResult};

/// Adapter for one external chat provider.
///
/// Implementations normalize the provider's webhook shape into the canonical
/// model and translate outbound sends into the provider's native API. They
/// are shared as `Arc<dyn MessagingProvider>` and must tolerate concurrent
/// use from many senders.
///
/// Send operations never return `Err`: every failure is a [`SendResult`]
/// with `success = false`.
#[async_trait]
pub trait MessagingProvider: PluginAdapter {
    /// Sends a plain text message.
    async fn send_text(&self, to: &str, body: &str) -> SendResult;

    /// Sends an image, audio or video hosted at `media_url`.
    async fn send_media(&self, to: &str, media_url: &str, caption: Option<&str>) -> SendResult;

    /// Sends a document hosted at `document_url` under the given file name.
    async fn send_document(
        &self,
        to: &str,
        document_url: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult;

    /// Sends a file supplied inline as base64.
    async fn send_file_base64(
        &self,
        to: &str,
        base64: &str,
        mime_type: &str,
        file_name: &str,
        caption: Option<&str>,
    ) -> SendResult;

    /// Name of the HTTP header that carries this provider's webhook credential,
    /// or `None` when the credential is embedded in the payload.
    fn auth_header(&self) -> Option<&'static str>;

    /// Checks the authenticity of a webhook. Fails closed: a missing or
    /// unparseable credential, or no configured secret, is a rejection.
    fn validate_webhook(&self, payload: &serde_json::Value, auth_header: Option<&str>) -> bool;

    /// Normalizes a webhook payload.
    ///
    /// Groups, newsletters, broadcasts and unsupported events come back as
    /// [`Inbound::Ignored`], never as an error.
    fn parse_incoming(&self, payload: &serde_json::Value) -> Inbound;
}
