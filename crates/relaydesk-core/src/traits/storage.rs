// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the ingestion pipeline's persistence backend.

use async_trait::async_trait;

use crate::error::RelaydeskError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChannelInstance, ChatLidMapping, Company, Conversation, ConversationStats, ConversationStatus,
    Customer, DeliveryStatus, InsertOutcome, MediaCompletion, MediaRecord, MediaStats,
    MediaStatus, Message, StatusApplication,
};

/// Adapter for storage and persistence backends.
///
/// Every get-or-create operation is atomic at the storage layer: concurrent
/// callers racing on the same unique key all receive the single winning row.
/// Tenant-scoped reads take the `company_id` and never return rows of
/// another company.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), RelaydeskError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), RelaydeskError>;

    // --- Tenants and instances ---

    async fn upsert_company(&self, id: &str, name: &str) -> Result<(), RelaydeskError>;

    async fn get_company(&self, id: &str) -> Result<Option<Company>, RelaydeskError>;

    async fn register_instance(&self, instance: &ChannelInstance) -> Result<(), RelaydeskError>;

    async fn find_instance(
        &self,
        provider: &str,
        instance_id: &str,
    ) -> Result<Option<ChannelInstance>, RelaydeskError>;

    async fn find_instance_by_phone(
        &self,
        provider: &str,
        phone: &str,
    ) -> Result<Option<ChannelInstance>, RelaydeskError>;

    // --- Customers ---

    async fn get_or_create_customer(
        &self,
        company_id: &str,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Customer, RelaydeskError>;

    async fn get_customer(
        &self,
        company_id: &str,
        customer_id: &str,
    ) -> Result<Option<Customer>, RelaydeskError>;

    /// Records the channel-native id if the customer has none yet.
    async fn set_customer_channel_id(
        &self,
        company_id: &str,
        customer_id: &str,
        channel_id: &str,
    ) -> Result<(), RelaydeskError>;

    async fn set_customer_blocked(
        &self,
        company_id: &str,
        customer_id: &str,
        blocked: bool,
    ) -> Result<(), RelaydeskError>;

    // --- Conversations ---

    /// Returns the customer's open conversation, creating one when none exists.
    ///
    /// The boolean is `true` when this call created the conversation.
    /// `campaign_id` only applies to a newly created conversation.
    async fn get_or_create_open_conversation(
        &self,
        company_id: &str,
        customer_id: &str,
        channel: &str,
        campaign_id: Option<&str>,
    ) -> Result<(Conversation, bool), RelaydeskError>;

    async fn find_open_conversation(
        &self,
        company_id: &str,
        customer_id: &str,
    ) -> Result<Option<Conversation>, RelaydeskError>;

    async fn get_conversation(
        &self,
        company_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, RelaydeskError>;

    async fn list_conversations_for_customer(
        &self,
        company_id: &str,
        customer_id: &str,
    ) -> Result<Vec<Conversation>, RelaydeskError>;

    async fn update_conversation_status(
        &self,
        company_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<(), RelaydeskError>;

    // --- Chat-lid mappings ---

    async fn find_chat_lid(&self, chat_lid: &str)
        -> Result<Option<ChatLidMapping>, RelaydeskError>;

    /// Inserts the mapping unless the chat-lid or the conversation is already
    /// mapped; returns the row that ended up stored.
    async fn bind_chat_lid(&self, mapping: &ChatLidMapping)
        -> Result<ChatLidMapping, RelaydeskError>;

    /// Points an existing mapping at a different conversation of the same
    /// company. Returns false when that conversation already had a chat-lid
    /// and the stale mapping was dropped instead.
    async fn rebind_chat_lid(
        &self,
        chat_lid: &str,
        conversation_id: &str,
        from_campaign: bool,
        campaign_id: Option<&str>,
    ) -> Result<bool, RelaydeskError>;

    async fn list_chat_lids_for_conversation(
        &self,
        company_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLidMapping>, RelaydeskError>;

    // --- Messages ---

    /// Inserts a message (and its media record, when given) in one
    /// transaction. A message whose external id already exists is a
    /// [`InsertOutcome::Duplicate`] and writes nothing.
    async fn insert_message(
        &self,
        message: &Message,
        media: Option<&MediaRecord>,
    ) -> Result<InsertOutcome, RelaydeskError>;

    async fn find_message_by_external_id(
        &self,
        external_message_id: &str,
    ) -> Result<Option<Message>, RelaydeskError>;

    async fn get_messages(
        &self,
        company_id: &str,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RelaydeskError>;

    /// Applies a delivery callback with forward-only semantics.
    async fn advance_message_status(
        &self,
        external_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<StatusApplication, RelaydeskError>;

    /// Attaches the provider id returned by a send to a pending message.
    async fn mark_message_sent(
        &self,
        message_id: &str,
        external_message_id: Option<&str>,
        status: DeliveryStatus,
    ) -> Result<InsertOutcome, RelaydeskError>;

    async fn conversation_stats(
        &self,
        company_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationStats, RelaydeskError>;

    // --- Media ---

    async fn get_media(&self, id: &str) -> Result<Option<MediaRecord>, RelaydeskError>;

    async fn find_media_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<MediaRecord>, RelaydeskError>;

    async fn list_media(
        &self,
        status: Option<MediaStatus>,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, RelaydeskError>;

    /// Compare-and-set transition. Returns `false` when the record was not in
    /// `from` (someone else moved it, or it does not exist).
    async fn transition_media(
        &self,
        id: &str,
        from: MediaStatus,
        to: MediaStatus,
        error_message: Option<&str>,
    ) -> Result<bool, RelaydeskError>;

    /// Moves `processing -> completed`, records the file, and links the path
    /// onto the originating message.
    async fn complete_media(
        &self,
        id: &str,
        completion: &MediaCompletion,
    ) -> Result<bool, RelaydeskError>;

    /// Operator replay: resets a `failed` record to `received`.
    async fn replay_media(
        &self,
        id: &str,
        source_url: Option<&str>,
    ) -> Result<MediaRecord, RelaydeskError>;

    /// Operator abort: moves any non-terminal record to `failed`.
    async fn mark_media_failed(
        &self,
        id: &str,
        reason: &str,
    ) -> Result<MediaRecord, RelaydeskError>;

    async fn media_stats(&self) -> Result<MediaStats, RelaydeskError>;
}
