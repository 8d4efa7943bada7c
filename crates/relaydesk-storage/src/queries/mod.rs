// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for operations on storage entities.

pub mod chat_lids;
pub mod companies;
pub mod conversations;
pub mod customers;
pub mod media;
pub mod messages;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::database::Database;

    pub(crate) async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        super::companies::upsert_company(&db, "acme", "Acme").await.unwrap();
        super::companies::upsert_company(&db, "globex", "Globex").await.unwrap();
        (db, dir)
    }
}
