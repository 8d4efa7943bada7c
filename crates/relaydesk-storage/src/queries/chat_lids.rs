// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-lid mapping operations.
//!
//! A chat-lid is the provider's own thread identifier. Once bound it points
//! at exactly one conversation, and a conversation is targeted by at most
//! one chat-lid; later inbound events with the same chat-lid skip the phone
//! lookup.

use relaydesk_core::RelaydeskError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{CHAT_LID_COLUMNS, ChatLidMapping, NOW, chat_lid_from_row};

pub async fn find_chat_lid(
    db: &Database,
    chat_lid: &str,
) -> Result<Option<ChatLidMapping>, RelaydeskError> {
    let chat_lid = chat_lid.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ChatLidMapping>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CHAT_LID_COLUMNS} FROM chat_lid_mappings WHERE chat_lid = ?1"),
                params![chat_lid],
                chat_lid_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert the mapping unless the chat-lid or the conversation is already bound.
///
/// Returns the stored row, which is the caller's mapping when it won and the
/// earlier binding (of the chat-lid, else of the conversation) when it lost.
pub async fn bind_chat_lid(
    db: &Database,
    mapping: &ChatLidMapping,
) -> Result<ChatLidMapping, RelaydeskError> {
    let mapping = mapping.clone();
    db.connection()
        .call(move |conn| -> Result<ChatLidMapping, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chat_lid_mappings
                    (chat_lid, conversation_id, company_id, from_campaign, campaign_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT DO NOTHING",
                params![
                    mapping.chat_lid,
                    mapping.conversation_id,
                    mapping.company_id,
                    mapping.from_campaign,
                    mapping.campaign_id,
                ],
            )?;
            let by_lid = tx
                .query_row(
                    &format!("SELECT {CHAT_LID_COLUMNS} FROM chat_lid_mappings WHERE chat_lid = ?1"),
                    params![mapping.chat_lid],
                    chat_lid_from_row,
                )
                .optional()?;
            let stored = match by_lid {
                Some(stored) => stored,
                None => tx.query_row(
                    &format!(
                        "SELECT {CHAT_LID_COLUMNS} FROM chat_lid_mappings WHERE conversation_id = ?1"
                    ),
                    params![mapping.conversation_id],
                    chat_lid_from_row,
                )?,
            };
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Point an existing mapping at another conversation of the same company.
///
/// Used when the mapped conversation was closed and the customer came back.
/// When the target conversation already has its own chat-lid, the stale
/// mapping is removed instead and `false` is returned.
pub async fn rebind_chat_lid(
    db: &Database,
    chat_lid: &str,
    conversation_id: &str,
    from_campaign: bool,
    campaign_id: Option<&str>,
) -> Result<bool, RelaydeskError> {
    let lid = chat_lid.to_string();
    let conversation_id = conversation_id.to_string();
    let campaign_id = campaign_id.map(str::to_string);
    let rebound = db
        .connection()
        .call(move |conn| -> Result<Option<bool>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let occupied: bool = tx.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM chat_lid_mappings
                    WHERE conversation_id = ?2 AND chat_lid != ?1
                      AND company_id = (SELECT company_id FROM chat_lid_mappings WHERE chat_lid = ?1))",
                params![lid, conversation_id],
                |row| row.get(0),
            )?;
            if occupied {
                tx.execute("DELETE FROM chat_lid_mappings WHERE chat_lid = ?1", params![lid])?;
                tx.commit()?;
                return Ok(Some(false));
            }
            let changed = tx.execute(
                &format!(
                    "UPDATE chat_lid_mappings
                     SET conversation_id = ?2, from_campaign = ?3, campaign_id = ?4,
                         updated_at = {NOW}
                     WHERE chat_lid = ?1
                       AND company_id = (SELECT company_id FROM conversations WHERE id = ?2)"
                ),
                params![lid, conversation_id, from_campaign, campaign_id],
            )?;
            tx.commit()?;
            Ok((changed > 0).then_some(true))
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    rebound.ok_or_else(|| RelaydeskError::not_found("chat_lid", chat_lid))
}

pub async fn list_for_conversation(
    db: &Database,
    company_id: &str,
    conversation_id: &str,
) -> Result<Vec<ChatLidMapping>, RelaydeskError> {
    let company_id = company_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ChatLidMapping>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_LID_COLUMNS} FROM chat_lid_mappings
                 WHERE company_id = ?1 AND conversation_id = ?2
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![company_id, conversation_id], chat_lid_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
