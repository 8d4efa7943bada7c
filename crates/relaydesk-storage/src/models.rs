// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `relaydesk-core::types` for use across
//! adapter trait boundaries. This module re-exports them and holds the
//! row-mapping helpers shared by the query modules.

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

pub use relaydesk_core::types::{
    ChannelInstance, ChatLidMapping, Company, Conversation, ConversationStats, Customer,
    MediaRecord, MediaStats, Message,
};

/// SQL expression for "now" in the stored timestamp format.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Parse a lowercase text column into one of the core enums.
pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    T::from_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) const CUSTOMER_COLUMNS: &str =
    "id, company_id, phone, channel_id, name, blocked, created_at, updated_at";

pub(crate) fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        company_id: row.get(1)?,
        phone: row.get(2)?,
        channel_id: row.get(3)?,
        name: row.get(4)?,
        blocked: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) const CONVERSATION_COLUMNS: &str =
    "id, company_id, customer_id, status, channel, campaign_id, created_at, updated_at";

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        company_id: row.get(1)?,
        customer_id: row.get(2)?,
        status: enum_col(row, 3)?,
        channel: row.get(4)?,
        campaign_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) const CHAT_LID_COLUMNS: &str =
    "chat_lid, conversation_id, company_id, from_campaign, campaign_id, created_at, updated_at";

pub(crate) fn chat_lid_from_row(row: &Row<'_>) -> rusqlite::Result<ChatLidMapping> {
    Ok(ChatLidMapping {
        chat_lid: row.get(0)?,
        conversation_id: row.get(1)?,
        company_id: row.get(2)?,
        from_campaign: row.get(3)?,
        campaign_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) const MESSAGE_COLUMNS: &str = "id, conversation_id, company_id, content, sender_type, \
     sender_id, message_type, external_message_id, status, ai_metadata, media_id, media_path, \
     created_at, updated_at";

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        company_id: row.get(2)?,
        content: row.get(3)?,
        sender_type: enum_col(row, 4)?,
        sender_id: row.get(5)?,
        message_type: enum_col(row, 6)?,
        external_message_id: row.get(7)?,
        status: enum_col(row, 8)?,
        ai_metadata: row.get(9)?,
        media_id: row.get(10)?,
        media_path: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub(crate) const MEDIA_COLUMNS: &str = "id, provider_message_id, message_id, company_id, \
     direction, kind, source_url, file_path, mime_type, duration_secs, size_bytes, status, \
     error_message, replay_count, created_at, updated_at, completed_at";

pub(crate) fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        id: row.get(0)?,
        provider_message_id: row.get(1)?,
        message_id: row.get(2)?,
        company_id: row.get(3)?,
        direction: enum_col(row, 4)?,
        kind: enum_col(row, 5)?,
        source_url: row.get(6)?,
        file_path: row.get(7)?,
        mime_type: row.get(8)?,
        duration_secs: row.get(9)?,
        size_bytes: row.get(10)?,
        status: enum_col(row, 11)?,
        error_message: row.get(12)?,
        replay_count: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        completed_at: row.get(16)?,
    })
}
