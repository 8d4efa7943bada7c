// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media record operations.
//!
//! Pipeline transitions are compare-and-set: the UPDATE carries
//! `WHERE status = <expected>`, and zero changed rows means another worker
//! (or an operator) moved the record first.

use relaydesk_core::RelaydeskError;
use relaydesk_core::types::{InsertOutcome, MediaCompletion, MediaStatus};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{MEDIA_COLUMNS, MediaRecord, MediaStats, NOW, media_from_row};

pub(crate) fn insert_media_row(
    conn: &rusqlite::Connection,
    media: &MediaRecord,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "INSERT INTO media (id, provider_message_id, message_id, company_id, direction, kind,
            source_url, mime_type, duration_secs, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(provider_message_id) DO NOTHING",
        params![
            media.id,
            media.provider_message_id,
            media.message_id,
            media.company_id,
            media.direction.to_string(),
            media.kind.to_string(),
            media.source_url,
            media.mime_type,
            media.duration_secs,
            media.status.to_string(),
        ],
    )
}

fn select_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<MediaRecord>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?1"),
        params![id],
        media_from_row,
    )
    .optional()
}

/// Insert a media record on its own. Duplicate provider ids are ignored.
pub async fn insert_media(db: &Database, media: &MediaRecord) -> Result<InsertOutcome, RelaydeskError> {
    let media = media.clone();
    let inserted = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> { insert_media_row(conn, &media) })
        .await
        .map_err(crate::database::map_tr_err)?;
    Ok(if inserted == 0 {
        InsertOutcome::Duplicate
    } else {
        InsertOutcome::Inserted
    })
}

pub async fn get_media(db: &Database, id: &str) -> Result<Option<MediaRecord>, RelaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MediaRecord>, rusqlite::Error> { select_by_id(conn, &id) })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_by_provider_id(
    db: &Database,
    provider_message_id: &str,
) -> Result<Option<MediaRecord>, RelaydeskError> {
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MediaRecord>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MEDIA_COLUMNS} FROM media WHERE provider_message_id = ?1"),
                params![provider_message_id],
                media_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List records, oldest first, optionally filtered by status.
pub async fn list_media(
    db: &Database,
    status: Option<MediaStatus>,
    limit: i64,
) -> Result<Vec<MediaRecord>, RelaydeskError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<MediaRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEDIA_COLUMNS} FROM media
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], media_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Compare-and-set `from -> to`. Returns whether the record moved.
///
/// Pairs that are not pipeline transitions are rejected before touching the
/// database.
pub async fn transition(
    db: &Database,
    id: &str,
    from: MediaStatus,
    to: MediaStatus,
    error_message: Option<&str>,
) -> Result<bool, RelaydeskError> {
    if !from.can_transition_to(to) {
        return Err(RelaydeskError::InvalidTransition {
            entity: "media",
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    let id = id.to_string();
    let error_message = error_message.map(str::to_string);
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE media SET status = ?3, error_message = COALESCE(?4, error_message),
                        updated_at = {NOW}
                     WHERE id = ?1 AND status = ?2"
                ),
                params![id, from.to_string(), to.to_string(), error_message],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    Ok(changed == 1)
}

/// Move `processing -> completed`, store the file details and link the file
/// onto the originating message.
pub async fn complete(
    db: &Database,
    id: &str,
    completion: &MediaCompletion,
) -> Result<bool, RelaydeskError> {
    let id = id.to_string();
    let completion = completion.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                &format!(
                    "UPDATE media SET status = 'completed', file_path = ?2, mime_type = ?3,
                        size_bytes = ?4, duration_secs = COALESCE(?5, duration_secs),
                        error_message = NULL, completed_at = {NOW}, updated_at = {NOW}
                     WHERE id = ?1 AND status = 'processing'"
                ),
                params![
                    id,
                    completion.file_path,
                    completion.mime_type,
                    completion.size_bytes,
                    completion.duration_secs,
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            tx.execute(
                &format!(
                    "UPDATE messages SET media_path = ?2, updated_at = {NOW}
                     WHERE id = (SELECT message_id FROM media WHERE id = ?1)"
                ),
                params![id, completion.file_path],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Result of an operator action guarded by the record's current status.
enum Guarded {
    Missing,
    Rejected(MediaStatus),
    Updated(MediaRecord),
}

fn guarded_result(
    guarded: Guarded,
    id: &str,
    to: MediaStatus,
) -> Result<MediaRecord, RelaydeskError> {
    match guarded {
        Guarded::Missing => Err(RelaydeskError::not_found("media", id)),
        Guarded::Rejected(current) => Err(RelaydeskError::InvalidTransition {
            entity: "media",
            from: current.to_string(),
            to: to.to_string(),
        }),
        Guarded::Updated(record) => Ok(record),
    }
}

/// Operator replay: reset a `failed` record to `received`.
///
/// Clears the error, bumps `replay_count` and optionally swaps in a fresh
/// source URL (provider URLs expire).
pub async fn replay(
    db: &Database,
    id: &str,
    source_url: Option<&str>,
) -> Result<MediaRecord, RelaydeskError> {
    let media_id = id.to_string();
    let source_url = source_url.map(str::to_string);
    let guarded = db
        .connection()
        .call(move |conn| -> Result<Guarded, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                &format!(
                    "UPDATE media SET status = 'received', error_message = NULL,
                        source_url = COALESCE(?2, source_url),
                        replay_count = replay_count + 1, updated_at = {NOW}
                     WHERE id = ?1 AND status = 'failed'"
                ),
                params![media_id, source_url],
            )?;
            let current = select_by_id(&tx, &media_id)?;
            tx.commit()?;
            Ok(match current {
                None => Guarded::Missing,
                Some(record) if changed == 0 => Guarded::Rejected(record.status),
                Some(record) => Guarded::Updated(record),
            })
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    guarded_result(guarded, id, MediaStatus::Received)
}

/// Operator abort: move any non-terminal record to `failed`.
pub async fn mark_failed(
    db: &Database,
    id: &str,
    reason: &str,
) -> Result<MediaRecord, RelaydeskError> {
    let media_id = id.to_string();
    let reason = reason.to_string();
    let guarded = db
        .connection()
        .call(move |conn| -> Result<Guarded, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                &format!(
                    "UPDATE media SET status = 'failed', error_message = ?2, updated_at = {NOW}
                     WHERE id = ?1 AND status IN ('received', 'downloading', 'processing')"
                ),
                params![media_id, reason],
            )?;
            let current = select_by_id(&tx, &media_id)?;
            tx.commit()?;
            Ok(match current {
                None => Guarded::Missing,
                Some(record) if changed == 0 => Guarded::Rejected(record.status),
                Some(record) => Guarded::Updated(record),
            })
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    guarded_result(guarded, id, MediaStatus::Failed)
}

/// Counts of records per status.
pub async fn stats(db: &Database) -> Result<MediaStats, RelaydeskError> {
    let counts = db
        .connection()
        .call(|conn| -> Result<Vec<(MediaStatus, i64)>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM media GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((crate::models::enum_col(row, 0)?, row.get(1)?))
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    let mut stats = MediaStats::default();
    for (status, count) in counts {
        stats.add(status, count);
    }
    Ok(stats)
}
