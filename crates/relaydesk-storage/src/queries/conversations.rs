// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation operations.
//!
//! A partial unique index keeps at most one non-closed conversation per
//! (company, customer); `get_or_create_open_conversation` relies on it.

use relaydesk_core::RelaydeskError;
use relaydesk_core::types::ConversationStatus;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{CONVERSATION_COLUMNS, Conversation, NOW, conversation_from_row};

fn open_conversation_query() -> String {
    format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE company_id = ?1 AND customer_id = ?2 AND status != 'closed'"
    )
}

/// Return the customer's open (or waiting) conversation, creating one if none exists.
///
/// The boolean is `true` when this call created it. An existing campaign
/// conversation is reused as-is; `campaign_id` only tags a new one.
pub async fn get_or_create_open_conversation(
    db: &Database,
    company_id: &str,
    customer_id: &str,
    channel: &str,
    campaign_id: Option<&str>,
) -> Result<(Conversation, bool), RelaydeskError> {
    let company_id = company_id.to_string();
    let customer_id = customer_id.to_string();
    let channel = channel.to_string();
    let campaign_id = campaign_id.map(str::to_string);
    let new_id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| -> Result<(Conversation, bool), rusqlite::Error> {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO conversations (id, company_id, customer_id, status, channel, campaign_id)
                 VALUES (?1, ?2, ?3, 'open', ?4, ?5)
                 ON CONFLICT DO NOTHING",
                params![new_id, company_id, customer_id, channel, campaign_id],
            )?;
            let conversation = tx.query_row(
                &open_conversation_query(),
                params![company_id, customer_id],
                conversation_from_row,
            )?;
            tx.commit()?;
            Ok((conversation, inserted == 1))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_open_conversation(
    db: &Database,
    company_id: &str,
    customer_id: &str,
) -> Result<Option<Conversation>, RelaydeskError> {
    let company_id = company_id.to_string();
    let customer_id = customer_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            conn.query_row(
                &open_conversation_query(),
                params![company_id, customer_id],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_conversation(
    db: &Database,
    company_id: &str,
    conversation_id: &str,
) -> Result<Option<Conversation>, RelaydeskError> {
    let company_id = company_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE company_id = ?1 AND id = ?2"
                ),
                params![company_id, conversation_id],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All conversations of a customer, oldest first.
pub async fn list_for_customer(
    db: &Database,
    company_id: &str,
    customer_id: &str,
) -> Result<Vec<Conversation>, RelaydeskError> {
    let company_id = company_id.to_string();
    let customer_id = customer_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE company_id = ?1 AND customer_id = ?2
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![company_id, customer_id], conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Change a conversation's status.
///
/// Reopening a closed conversation while another one is open violates the
/// one-open-conversation index and surfaces as a storage error.
pub async fn update_status(
    db: &Database,
    company_id: &str,
    conversation_id: &str,
    status: ConversationStatus,
) -> Result<(), RelaydeskError> {
    let company = company_id.to_string();
    let id = conversation_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE conversations SET status = ?3, updated_at = {NOW}
                     WHERE company_id = ?1 AND id = ?2"
                ),
                params![company, id, status.to_string()],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(RelaydeskError::not_found("conversation", conversation_id));
    }
    Ok(())
}
