// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations: deduplicated insert, delivery status, statistics.

use relaydesk_core::RelaydeskError;
use relaydesk_core::types::{
    DeliveryStatus, InsertOutcome, PHONE_SENDER_ID, SenderType, StatusApplication,
};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{
    ConversationStats, MESSAGE_COLUMNS, MediaRecord, Message, NOW, message_from_row,
};

/// Insert a message and, optionally, its media record in one transaction.
///
/// The message's `external_message_id` is the deduplication key: when a row
/// with the same id already exists nothing is written and the outcome is
/// [`InsertOutcome::Duplicate`].
pub async fn insert_message(
    db: &Database,
    msg: &Message,
    media: Option<&MediaRecord>,
) -> Result<InsertOutcome, RelaydeskError> {
    let msg = msg.clone();
    let media = media.cloned();
    db.connection()
        .call(move |conn| -> Result<InsertOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO messages (id, conversation_id, company_id, content, sender_type,
                    sender_id, message_type, external_message_id, status, ai_metadata,
                    media_id, media_path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(external_message_id) DO NOTHING",
                params![
                    msg.id,
                    msg.conversation_id,
                    msg.company_id,
                    msg.content,
                    msg.sender_type.to_string(),
                    msg.sender_id,
                    msg.message_type.to_string(),
                    msg.external_message_id,
                    msg.status.to_string(),
                    msg.ai_metadata,
                    msg.media_id,
                    msg.media_path,
                    msg.created_at,
                    msg.updated_at,
                ],
            )?;
            if inserted == 0 {
                tx.rollback()?;
                return Ok(InsertOutcome::Duplicate);
            }
            if let Some(media) = media {
                crate::queries::media::insert_media_row(&tx, &media)?;
            }
            tx.commit()?;
            Ok(InsertOutcome::Inserted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_by_external_id(
    db: &Database,
    external_message_id: &str,
) -> Result<Option<Message>, RelaydeskError> {
    let external_message_id = external_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_message_id = ?1"),
                params![external_message_id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Messages of a conversation in chronological order.
pub async fn get_messages_for_conversation(
    db: &Database,
    company_id: &str,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<Message>, RelaydeskError> {
    let company_id = company_id.to_string();
    let conversation_id = conversation_id.to_string();
    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.unwrap_or(-1);
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE company_id = ?1 AND conversation_id = ?2
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![company_id, conversation_id, limit], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a delivery callback to the message with `external_message_id`.
///
/// Reads the current status and writes the new one in the same closure, so
/// two callbacks for one message can never interleave.
pub async fn advance_status(
    db: &Database,
    external_message_id: &str,
    incoming: DeliveryStatus,
) -> Result<StatusApplication, RelaydeskError> {
    let external_message_id = external_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<StatusApplication, rusqlite::Error> {
            let tx = conn.transaction()?;
            let current: Option<(String, DeliveryStatus)> = tx
                .query_row(
                    "SELECT id, status FROM messages WHERE external_message_id = ?1",
                    params![external_message_id],
                    |row| Ok((row.get(0)?, crate::models::enum_col(row, 1)?)),
                )
                .optional()?;
            let Some((id, current)) = current else {
                return Ok(StatusApplication::Unknown);
            };
            let outcome = match DeliveryStatus::advance(current, incoming) {
                Some(next) => {
                    tx.execute(
                        &format!(
                            "UPDATE messages SET status = ?2, updated_at = {NOW}
                             WHERE id = ?1 AND status = ?3"
                        ),
                        params![id, next.to_string(), current.to_string()],
                    )?;
                    StatusApplication::Applied {
                        from: current,
                        to: next,
                    }
                }
                None => StatusApplication::Unchanged(current),
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the outcome of an outbound send on a stored message.
///
/// A `fromMe` webhook can land before the send call returns and store the
/// same provider id as a phone-typed agent message. That echo row is folded
/// into the send's row: it is deleted, its provider id moves over and the
/// further-advanced status of the two wins.
///
/// Returns [`InsertOutcome::Duplicate`] when the provider id belongs to any
/// other message; the status is still updated.
pub async fn mark_sent(
    db: &Database,
    message_id: &str,
    external_message_id: Option<&str>,
    status: DeliveryStatus,
) -> Result<InsertOutcome, RelaydeskError> {
    let id = message_id.to_string();
    let external_message_id = external_message_id.map(str::to_string);
    let result = db
        .connection()
        .call(move |conn| -> Result<(usize, InsertOutcome), rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut outcome = InsertOutcome::Inserted;
            let mut status = status;
            if let Some(ext) = &external_message_id {
                let holder: Option<(String, SenderType, String, DeliveryStatus, Option<String>)> = tx
                    .query_row(
                        "SELECT id, sender_type, sender_id, status, media_id FROM messages
                         WHERE external_message_id = ?1 AND id != ?2",
                        params![ext, id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                crate::models::enum_col(row, 1)?,
                                row.get(2)?,
                                crate::models::enum_col(row, 3)?,
                                row.get(4)?,
                            ))
                        },
                    )
                    .optional()?;
                match holder {
                    None => {
                        tx.execute(
                            "UPDATE messages SET external_message_id = ?2 WHERE id = ?1",
                            params![id, ext],
                        )?;
                    }
                    Some((echo_id, SenderType::Agent, sender_id, echo_status, None))
                        if sender_id == PHONE_SENDER_ID =>
                    {
                        tx.execute("DELETE FROM messages WHERE id = ?1", params![echo_id])?;
                        tx.execute(
                            "UPDATE messages SET external_message_id = ?2 WHERE id = ?1",
                            params![id, ext],
                        )?;
                        status = DeliveryStatus::advance(status, echo_status).unwrap_or(status);
                    }
                    Some(_) => outcome = InsertOutcome::Duplicate,
                }
            }
            let changed = tx.execute(
                &format!("UPDATE messages SET status = ?2, updated_at = {NOW} WHERE id = ?1"),
                params![id, status.to_string()],
            )?;
            tx.commit()?;
            Ok((changed, outcome))
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    match result {
        (0, _) => Err(RelaydeskError::not_found("message", message_id)),
        (_, outcome) => Ok(outcome),
    }
}

/// Message counts by sender type for one conversation.
pub async fn conversation_stats(
    db: &Database,
    company_id: &str,
    conversation_id: &str,
) -> Result<ConversationStats, RelaydeskError> {
    let company_id = company_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<ConversationStats, rusqlite::Error> {
            let mut stats = ConversationStats {
                conversation_id: conversation_id.clone(),
                ..Default::default()
            };
            let mut stmt = conn.prepare(
                "SELECT sender_type, COUNT(*) FROM messages
                 WHERE company_id = ?1 AND conversation_id = ?2
                 GROUP BY sender_type",
            )?;
            let rows = stmt.query_map(params![company_id, conversation_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (sender_type, count) = row?;
                match sender_type.as_str() {
                    "customer" => stats.from_customer = count,
                    "agent" => stats.from_agent = count,
                    "system" => stats.from_system = count,
                    _ => {}
                }
                stats.total += count;
            }
            Ok(stats)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
