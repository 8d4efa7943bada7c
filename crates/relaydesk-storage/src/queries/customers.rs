// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer operations.

use relaydesk_core::RelaydeskError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{CUSTOMER_COLUMNS, Customer, NOW, customer_from_row};

/// Return the customer with `phone` in `company_id`, creating it if needed.
///
/// Insert-or-ignore followed by a re-read in the same closure, so concurrent
/// first messages from one phone converge on a single row. A known name is
/// never overwritten; an empty one is filled in.
pub async fn get_or_create_customer(
    db: &Database,
    company_id: &str,
    phone: &str,
    name: Option<&str>,
) -> Result<Customer, RelaydeskError> {
    let company_id = company_id.to_string();
    let phone = phone.to_string();
    let name = name.map(str::to_string);
    let new_id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| -> Result<Customer, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO customers (id, company_id, phone, name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(company_id, phone) DO NOTHING",
                params![new_id, company_id, phone, name],
            )?;
            if name.is_some() {
                tx.execute(
                    &format!(
                        "UPDATE customers SET name = ?3, updated_at = {NOW}
                         WHERE company_id = ?1 AND phone = ?2 AND name IS NULL"
                    ),
                    params![company_id, phone, name],
                )?;
            }
            let customer = tx.query_row(
                &format!(
                    "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE company_id = ?1 AND phone = ?2"
                ),
                params![company_id, phone],
                customer_from_row,
            )?;
            tx.commit()?;
            Ok(customer)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_customer(
    db: &Database,
    company_id: &str,
    customer_id: &str,
) -> Result<Option<Customer>, RelaydeskError> {
    let company_id = company_id.to_string();
    let customer_id = customer_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Customer>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE company_id = ?1 AND id = ?2"),
                params![company_id, customer_id],
                customer_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the channel-native id, only if none is stored yet.
pub async fn set_channel_id(
    db: &Database,
    company_id: &str,
    customer_id: &str,
    channel_id: &str,
) -> Result<(), RelaydeskError> {
    let company_id = company_id.to_string();
    let customer_id = customer_id.to_string();
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE customers SET channel_id = ?3, updated_at = {NOW}
                     WHERE company_id = ?1 AND id = ?2 AND channel_id IS NULL"
                ),
                params![company_id, customer_id, channel_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Block or unblock a customer. Errors with `NotFound` for unknown ids.
pub async fn set_blocked(
    db: &Database,
    company_id: &str,
    customer_id: &str,
    blocked: bool,
) -> Result<(), RelaydeskError> {
    let id = customer_id.to_string();
    let company = company_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE customers SET blocked = ?3, updated_at = {NOW}
                     WHERE company_id = ?1 AND id = ?2"
                ),
                params![company, id, blocked],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(RelaydeskError::not_found("customer", customer_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;
    use std::sync::Arc;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let first = get_or_create_customer(&db, "acme", "5511888888888", Some("Ana"))
            .await
            .unwrap();
        let second = get_or_create_customer(&db, "acme", "5511888888888", Some("Other"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Ana"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn name_is_filled_when_missing() {
        let (db, _dir) = setup_db().await;
        let first = get_or_create_customer(&db, "acme", "5511", None).await.unwrap();
        assert!(first.name.is_none());
        let second = get_or_create_customer(&db, "acme", "5511", Some("Ana")).await.unwrap();
        assert_eq!(second.name.as_deref(), Some("Ana"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn same_phone_in_two_companies_is_two_customers() {
        let (db, _dir) = setup_db().await;
        let a = get_or_create_customer(&db, "acme", "5511", None).await.unwrap();
        let g = get_or_create_customer(&db, "globex", "5511", None).await.unwrap();
        assert_ne!(a.id, g.id);
        assert!(get_customer(&db, "globex", &a.id).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_creates_converge_on_one_row() {
        let (db, _dir) = setup_db().await;
        let db = Arc::new(db);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                get_or_create_customer(&db, "acme", "5511777", None)
                    .await
                    .unwrap()
                    .id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn channel_id_is_only_set_once() {
        let (db, _dir) = setup_db().await;
        let c = get_or_create_customer(&db, "acme", "5511", None).await.unwrap();
        set_channel_id(&db, "acme", &c.id, "lid-1").await.unwrap();
        set_channel_id(&db, "acme", &c.id, "lid-2").await.unwrap();
        let c = get_customer(&db, "acme", &c.id).await.unwrap().unwrap();
        assert_eq!(c.channel_id.as_deref(), Some("lid-1"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn blocking_unknown_customer_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = set_blocked(&db, "acme", "nope", true).await.unwrap_err();
        assert!(matches!(err, RelaydeskError::NotFound { .. }));

        let c = get_or_create_customer(&db, "acme", "5511", None).await.unwrap();
        set_blocked(&db, "acme", &c.id, true).await.unwrap();
        assert!(get_customer(&db, "acme", &c.id).await.unwrap().unwrap().blocked);
        db.close().await.unwrap();
    }
}
