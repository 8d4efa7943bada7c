// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use relaydesk_config::model::StorageConfig;
use relaydesk_core::types::{
    ChannelInstance, ChatLidMapping, Company, Conversation, ConversationStats, ConversationStatus,
    Customer, DeliveryStatus, InsertOutcome, MediaCompletion, MediaRecord, MediaStats,
    MediaStatus, Message, StatusApplication,
};
use relaydesk_core::{AdapterType, HealthStatus, PluginAdapter, RelaydeskError, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, RelaydeskError> {
        self.db.get().ok_or_else(|| RelaydeskError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), RelaydeskError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> { crate::database::checkpoint(conn) })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RelaydeskError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelaydeskError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), RelaydeskError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| RelaydeskError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RelaydeskError> {
        let db = self.db()?;
        self.checkpoint(db).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Tenants and instances ---

    async fn upsert_company(&self, id: &str, name: &str) -> Result<(), RelaydeskError> {
        queries::companies::upsert_company(self.db()?, id, name).await
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, RelaydeskError> {
        queries::companies::get_company(self.db()?, id).await
    }

    async fn register_instance(&self, instance: &ChannelInstance) -> Result<(), RelaydeskError> {
        queries::companies::register_instance(self.db()?, instance).await
    }

    async fn find_instance(
        &self,
        provider: &str,
        instance_id: &str,
    ) -> Result<Option<ChannelInstance>, RelaydeskError> {
        queries::companies::find_instance(self.db()?, provider, instance_id).await
    }

    async fn find_instance_by_phone(
        &self,
        provider: &str,
        phone: &str,
    ) -> Result<Option<ChannelInstance>, RelaydeskError> {
        queries::companies::find_instance_by_phone(self.db()?, provider, phone).await
    }

    // --- Customers ---

    async fn get_or_create_customer(
        &self,
        company_id: &str,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Customer, RelaydeskError> {
        queries::customers::get_or_create_customer(self.db()?, company_id, phone, name).await
    }

    async fn get_customer(
        &self,
        company_id: &str,
        customer_id: &str,
    ) -> Result<Option<Customer>, RelaydeskError> {
        queries::customers::get_customer(self.db()?, company_id, customer_id).await
    }

    async fn set_customer_channel_id(
        &self,
        company_id: &str,
        customer_id: &str,
        channel_id: &str,
    ) -> Result<(), RelaydeskError> {
        queries::customers::set_channel_id(self.db()?, company_id, customer_id, channel_id).await
    }

    async fn set_customer_blocked(
        &self,
        company_id: &str,
        customer_id: &str,
        blocked: bool,
    ) -> Result<(), RelaydeskError> {
        queries::customers::set_blocked(self.db()?, company_id, customer_id, blocked).await
    }

    // --- Conversations ---

    async fn get_or_create_open_conversation(
        &self,
        company_id: &str,
        customer_id: &str,
        channel: &str,
        campaign_id: Option<&str>,
    ) -> Result<(Conversation, bool), RelaydeskError> {
        queries::conversations::get_or_create_open_conversation(
            self.db()?,
            company_id,
            customer_id,
            channel,
            campaign_id,
        )
        .await
    }

    async fn find_open_conversation(
        &self,
        company_id: &str,
        customer_id: &str,
    ) -> Result<Option<Conversation>, RelaydeskError> {
        queries::conversations::find_open_conversation(self.db()?, company_id, customer_id).await
    }

    async fn get_conversation(
        &self,
        company_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, RelaydeskError> {
        queries::conversations::get_conversation(self.db()?, company_id, conversation_id).await
    }

    async fn list_conversations_for_customer(
        &self,
        company_id: &str,
        customer_id: &str,
    ) -> Result<Vec<Conversation>, RelaydeskError> {
        queries::conversations::list_for_customer(self.db()?, company_id, customer_id).await
    }

    async fn update_conversation_status(
        &self,
        company_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<(), RelaydeskError> {
        queries::conversations::update_status(self.db()?, company_id, conversation_id, status)
            .await
    }

    // --- Chat-lid mappings ---

    async fn find_chat_lid(
        &self,
        chat_lid: &str,
    ) -> Result<Option<ChatLidMapping>, RelaydeskError> {
        queries::chat_lids::find_chat_lid(self.db()?, chat_lid).await
    }

    async fn bind_chat_lid(
        &self,
        mapping: &ChatLidMapping,
    ) -> Result<ChatLidMapping, RelaydeskError> {
        queries::chat_lids::bind_chat_lid(self.db()?, mapping).await
    }

    async fn rebind_chat_lid(
        &self,
        chat_lid: &str,
        conversation_id: &str,
        from_campaign: bool,
        campaign_id: Option<&str>,
    ) -> Result<bool, RelaydeskError> {
        queries::chat_lids::rebind_chat_lid(
            self.db()?,
            chat_lid,
            conversation_id,
            from_campaign,
            campaign_id,
        )
        .await
    }

    async fn list_chat_lids_for_conversation(
        &self,
        company_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ChatLidMapping>, RelaydeskError> {
        queries::chat_lids::list_for_conversation(self.db()?, company_id, conversation_id).await
    }

    // --- Messages ---

    async fn insert_message(
        &self,
        message: &Message,
        media: Option<&MediaRecord>,
    ) -> Result<InsertOutcome, RelaydeskError> {
        queries::messages::insert_message(self.db()?, message, media).await
    }

    async fn find_message_by_external_id(
        &self,
        external_message_id: &str,
    ) -> Result<Option<Message>, RelaydeskError> {
        queries::messages::find_by_external_id(self.db()?, external_message_id).await
    }

    async fn get_messages(
        &self,
        company_id: &str,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RelaydeskError> {
        queries::messages::get_messages_for_conversation(self.db()?, company_id, conversation_id, limit)
            .await
    }

    async fn advance_message_status(
        &self,
        external_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<StatusApplication, RelaydeskError> {
        queries::messages::advance_status(self.db()?, external_message_id, status).await
    }

    async fn mark_message_sent(
        &self,
        message_id: &str,
        external_message_id: Option<&str>,
        status: DeliveryStatus,
    ) -> Result<InsertOutcome, RelaydeskError> {
        queries::messages::mark_sent(self.db()?, message_id, external_message_id, status).await
    }

    async fn conversation_stats(
        &self,
        company_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationStats, RelaydeskError> {
        queries::messages::conversation_stats(self.db()?, company_id, conversation_id).await
    }

    // --- Media ---

    async fn get_media(&self, id: &str) -> Result<Option<MediaRecord>, RelaydeskError> {
        queries::media::get_media(self.db()?, id).await
    }

    async fn find_media_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<MediaRecord>, RelaydeskError> {
        queries::media::find_by_provider_id(self.db()?, provider_message_id).await
    }

    async fn list_media(
        &self,
        status: Option<MediaStatus>,
        limit: i64,
    ) -> Result<Vec<MediaRecord>, RelaydeskError> {
        queries::media::list_media(self.db()?, status, limit).await
    }

    async fn transition_media(
        &self,
        id: &str,
        from: MediaStatus,
        to: MediaStatus,
        error_message: Option<&str>,
    ) -> Result<bool, RelaydeskError> {
        queries::media::transition(self.db()?, id, from, to, error_message).await
    }

    async fn complete_media(
        &self,
        id: &str,
        completion: &MediaCompletion,
    ) -> Result<bool, RelaydeskError> {
        queries::media::complete(self.db()?, id, completion).await
    }

    async fn replay_media(
        &self,
        id: &str,
        source_url: Option<&str>,
    ) -> Result<MediaRecord, RelaydeskError> {
        queries::media::replay(self.db()?, id, source_url).await
    }

    async fn mark_media_failed(
        &self,
        id: &str,
        reason: &str,
    ) -> Result<MediaRecord, RelaydeskError> {
        queries::media::mark_failed(self.db()?, id, reason).await
    }

    async fn media_stats(&self) -> Result<MediaStats, RelaydeskError> {
        queries::media::stats(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn health_check_tracks_initialization() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn tenant_thread_roundtrip_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("roundtrip.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();

        storage.upsert_company("acme", "Acme").await.unwrap();
        storage
            .register_instance(&ChannelInstance {
                provider: "zapi".to_string(),
                instance_id: "inst-1".to_string(),
                company_id: "acme".to_string(),
                phone: Some("5511999999999".to_string()),
            })
            .await
            .unwrap();
        let instance = storage.find_instance("zapi", "inst-1").await.unwrap().unwrap();

        let customer = storage
            .get_or_create_customer(&instance.company_id, "5511888888888", Some("Ana"))
            .await
            .unwrap();
        let (conversation, created) = storage
            .get_or_create_open_conversation("acme", &customer.id, "zapi", None)
            .await
            .unwrap();
        assert!(created);

        let stored = storage
            .bind_chat_lid(&ChatLidMapping {
                chat_lid: "lid-42".to_string(),
                conversation_id: conversation.id.clone(),
                company_id: "acme".to_string(),
                from_campaign: false,
                campaign_id: None,
                created_at: String::new(),
                updated_at: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(stored.conversation_id, conversation.id);
        assert_eq!(
            storage.find_chat_lid("lid-42").await.unwrap().unwrap().company_id,
            "acme"
        );

        assert_eq!(storage.media_stats().await.unwrap().total(), 0);
        storage.close().await.unwrap();
    }
}
