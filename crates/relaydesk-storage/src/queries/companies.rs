// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant and provider-instance operations.

use relaydesk_core::RelaydeskError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{ChannelInstance, Company};

/// Insert a company or update its name.
pub async fn upsert_company(db: &Database, id: &str, name: &str) -> Result<(), RelaydeskError> {
    let id = id.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO companies (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![id, name],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_company(db: &Database, id: &str) -> Result<Option<Company>, RelaydeskError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Company>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, name, created_at FROM companies WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Company {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Register a provider instance for a company, replacing any previous owner.
pub async fn register_instance(
    db: &Database,
    instance: &ChannelInstance,
) -> Result<(), RelaydeskError> {
    let instance = instance.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO channel_instances (provider, instance_id, company_id, phone)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(provider, instance_id) DO UPDATE SET
                    company_id = excluded.company_id,
                    phone = excluded.phone",
                params![
                    instance.provider,
                    instance.instance_id,
                    instance.company_id,
                    instance.phone,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_instance(
    db: &Database,
    provider: &str,
    instance_id: &str,
) -> Result<Option<ChannelInstance>, RelaydeskError> {
    let provider = provider.to_string();
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ChannelInstance>, rusqlite::Error> {
            conn.query_row(
                "SELECT provider, instance_id, company_id, phone
                 FROM channel_instances WHERE provider = ?1 AND instance_id = ?2",
                params![provider, instance_id],
                instance_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find the instance whose connected number is `phone`.
///
/// Returns `None` when no instance or more than one instance claims the
/// number, since either way the tenant cannot be decided.
pub async fn find_instance_by_phone(
    db: &Database,
    provider: &str,
    phone: &str,
) -> Result<Option<ChannelInstance>, RelaydeskError> {
    let provider = provider.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ChannelInstance>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT provider, instance_id, company_id, phone
                 FROM channel_instances WHERE provider = ?1 AND phone = ?2
                 LIMIT 2",
            )?;
            let rows = stmt
                .query_map(params![provider, phone], instance_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match rows.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn instance_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelInstance> {
    Ok(ChannelInstance {
        provider: row.get(0)?,
        instance_id: row.get(1)?,
        company_id: row.get(2)?,
        phone: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    fn instance(id: &str, company: &str, phone: Option<&str>) -> ChannelInstance {
        ChannelInstance {
            provider: "zapi".to_string(),
            instance_id: id.to_string(),
            company_id: company.to_string(),
            phone: phone.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn upsert_company_updates_name() {
        let (db, _dir) = setup_db().await;
        upsert_company(&db, "acme", "Acme Corp").await.unwrap();
        let company = get_company(&db, "acme").await.unwrap().unwrap();
        assert_eq!(company.name, "Acme Corp");
        assert!(get_company(&db, "missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn instances_resolve_by_id_and_phone() {
        let (db, _dir) = setup_db().await;
        register_instance(&db, &instance("i-1", "acme", Some("5511999999999")))
            .await
            .unwrap();

        let by_id = find_instance(&db, "zapi", "i-1").await.unwrap().unwrap();
        assert_eq!(by_id.company_id, "acme");
        assert!(find_instance(&db, "evolution", "i-1").await.unwrap().is_none());

        let by_phone = find_instance_by_phone(&db, "zapi", "5511999999999")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_phone.instance_id, "i-1");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn shared_phone_is_ambiguous() {
        let (db, _dir) = setup_db().await;
        register_instance(&db, &instance("i-1", "acme", Some("5511"))).await.unwrap();
        register_instance(&db, &instance("i-2", "globex", Some("5511"))).await.unwrap();
        assert!(find_instance_by_phone(&db, "zapi", "5511").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reregistering_moves_instance() {
        let (db, _dir) = setup_db().await;
        register_instance(&db, &instance("i-1", "acme", None)).await.unwrap();
        register_instance(&db, &instance("i-1", "globex", None)).await.unwrap();
        let found = find_instance(&db, "zapi", "i-1").await.unwrap().unwrap();
        assert_eq!(found.company_id, "globex");
        db.close().await.unwrap();
    }
}
