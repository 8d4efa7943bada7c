// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the ingestion stack with mock providers, a temp
//! SQLite database and a temp media directory. Two tenants are seeded:
//!
//! | company | provider  | instance      | business phone |
//! |---------|-----------|---------------|----------------|
//! | acme    | zapi      | `ACME-ZAPI`   | 5511999999999  |
//! | acme    | evolution | `acme-main`   | 5511999999999  |
//! | globex  | zapi      | `GLOBEX-ZAPI` | 5521777777777  |

use std::path::PathBuf;
use std::sync::Arc;

use relaydesk_config::model::{InstanceConfig, RelaydeskConfig, StorageConfig};
use relaydesk_core::{MessagingProvider, RelaydeskError, StorageAdapter};
use relaydesk_ingest::{
    JobOutcome, MediaProcessor, MediaQueue, MediaService, OutboundService, WebhookOutcome,
    WebhookPipeline,
};
use relaydesk_storage::SqliteStorage;
use relaydesk_whatsapp::{ProviderRegistry, RetryPolicy};
use tokio::sync::{Mutex, mpsc};

use crate::mock_provider::MockProvider;

/// Webhook secret both mock providers accept.
pub const WEBHOOK_TOKEN: &str = "test-webhook-token";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    active: String,
    queue_capacity: usize,
    max_download_bytes: Option<u64>,
    retry: RetryPolicy,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            active: "zapi".to_string(),
            queue_capacity: 64,
            max_download_bytes: None,
            retry: RetryPolicy::NONE,
        }
    }

    /// Start with `name` as the active provider.
    pub fn with_active_provider(mut self, name: &str) -> Self {
        self.active = name.to_string();
        self
    }

    /// Capacity of the media job queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Cap on media download size.
    pub fn with_max_download_bytes(mut self, bytes: u64) -> Self {
        self.max_download_bytes = Some(bytes);
        self
    }

    /// Retry policy for outbound sends. Defaults to no retries.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, RelaydeskError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| RelaydeskError::Storage { source: e.into() })?;

        let mut config = RelaydeskConfig {
            storage: StorageConfig {
                database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
                wal_mode: true,
            },
            instances: default_instances(),
            ..RelaydeskConfig::default()
        };
        config.media.storage_dir = temp_dir.path().join("media").to_string_lossy().into_owned();
        config.media.queue_capacity = self.queue_capacity;
        if let Some(max) = self.max_download_bytes {
            config.media.max_download_bytes = max;
        }
        config.providers.active = self.active.clone();

        let sqlite = SqliteStorage::new(config.storage.clone());
        sqlite.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(sqlite);
        relaydesk_ingest::seed_instances(storage.as_ref(), &config.instances).await?;

        let zapi = Arc::new(MockProvider::zapi(WEBHOOK_TOKEN));
        let evolution = Arc::new(MockProvider::evolution(WEBHOOK_TOKEN));
        let registry = Arc::new(ProviderRegistry::new(
            vec![
                Arc::clone(&zapi) as Arc<dyn MessagingProvider>,
                Arc::clone(&evolution) as Arc<dyn MessagingProvider>,
            ],
            &self.active,
        )?);

        let (queue, rx) = MediaQueue::bounded(config.media.queue_capacity);
        let pipeline = WebhookPipeline::new(Arc::clone(&storage), queue.clone());
        let media = MediaService::new(Arc::clone(&storage), queue.clone());
        let processor = MediaProcessor::new(Arc::clone(&storage), &config.media)?;
        let outbound = OutboundService::new(Arc::clone(&storage), Arc::clone(&registry), self.retry);

        Ok(TestHarness {
            storage,
            zapi,
            evolution,
            registry,
            pipeline,
            outbound,
            media,
            processor,
            queue,
            media_rx: Mutex::new(rx),
            config,
            _temp_dir: temp_dir,
        })
    }
}

fn default_instances() -> Vec<InstanceConfig> {
    let instance = |provider: &str, instance_id: &str, company: &str, phone: &str| InstanceConfig {
        provider: provider.to_string(),
        instance_id: instance_id.to_string(),
        company_id: company.to_string(),
        company_name: None,
        phone: Some(phone.to_string()),
    };
    vec![
        instance("zapi", "ACME-ZAPI", "acme", "5511999999999"),
        instance("evolution", "acme-main", "acme", "5511999999999"),
        instance("zapi", "GLOBEX-ZAPI", "globex", "5521777777777"),
    ]
}

/// A complete test environment with mock providers and temp storage.
///
/// Media jobs are queued but not run automatically; call
/// [`run_media_jobs`](Self::run_media_jobs) to process them inline.
pub struct TestHarness {
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    pub zapi: Arc<MockProvider>,
    pub evolution: Arc<MockProvider>,
    pub registry: Arc<ProviderRegistry>,
    pub pipeline: WebhookPipeline,
    pub outbound: OutboundService,
    pub media: MediaService,
    pub processor: MediaProcessor,
    pub queue: MediaQueue,
    media_rx: Mutex<mpsc::Receiver<String>>,
    pub config: RelaydeskConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default options.
    pub async fn new() -> Result<Self, RelaydeskError> {
        Self::builder().build().await
    }

    /// Deliver a webhook to the named provider with a valid credential.
    pub async fn webhook(&self, provider: &str, payload: serde_json::Value) -> WebhookOutcome {
        let mut payload = payload;
        if provider == "evolution"
            && let Some(obj) = payload.as_object_mut()
        {
            obj.entry("apikey")
                .or_insert_with(|| serde_json::Value::String(WEBHOOK_TOKEN.to_string()));
        }
        self.webhook_with_token(provider, payload, Some(WEBHOOK_TOKEN))
            .await
    }

    /// Deliver a webhook with an explicit header credential.
    pub async fn webhook_with_token(
        &self,
        provider: &str,
        payload: serde_json::Value,
        token: Option<&str>,
    ) -> WebhookOutcome {
        let adapter = match provider {
            "zapi" => Arc::clone(&self.zapi) as Arc<dyn MessagingProvider>,
            _ => Arc::clone(&self.evolution) as Arc<dyn MessagingProvider>,
        };
        self.pipeline.handle(adapter.as_ref(), &payload, token).await
    }

    /// Ids currently waiting in the media queue.
    pub async fn queued_media(&self) -> Vec<String> {
        let mut rx = self.media_rx.lock().await;
        let mut ids = Vec::new();
        while let Ok(id) = rx.try_recv() {
            self.queue.dequeued(&id);
            ids.push(id);
        }
        ids
    }

    /// Drain the media queue, processing every job inline.
    pub async fn run_media_jobs(&self) -> Result<Vec<JobOutcome>, RelaydeskError> {
        let mut outcomes = Vec::new();
        for id in self.queued_media().await {
            outcomes.push(self.processor.process(&id).await?);
        }
        Ok(outcomes)
    }

    /// Root of the temp media directory.
    pub fn media_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.media.storage_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_seeds_tenants() {
        let harness = TestHarness::new().await.unwrap();
        let acme = harness
            .storage
            .find_instance("zapi", "ACME-ZAPI")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acme.company_id, "acme");
        let by_phone = harness
            .storage
            .find_instance_by_phone("zapi", "5521777777777")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_phone.company_id, "globex");
        assert_eq!(harness.registry.current_name(), "zapi");
    }
}
