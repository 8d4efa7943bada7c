// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `relaydesk serve` command implementation.
//!
//! Opens storage, seeds the configured instances, builds the provider
//! registry, starts the media workers and serves the gateway until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relaydesk_config::model::RelaydeskConfig;
use relaydesk_core::{RelaydeskError, StorageAdapter};
use relaydesk_gateway::{AuthConfig, GatewayState, HealthState};
use relaydesk_ingest::{
    MediaProcessor, MediaQueue, MediaService, MediaWorkers, OutboundService, WebhookPipeline,
};
use relaydesk_prometheus::PrometheusAdapter;
use relaydesk_storage::SqliteStorage;
use relaydesk_whatsapp::{ProviderRegistry, RetryPolicy};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::shutdown;

/// The assembled service, ready to serve.
struct Service {
    config: RelaydeskConfig,
    storage: Arc<dyn StorageAdapter>,
    registry: Arc<ProviderRegistry>,
    state: GatewayState,
    processor: MediaProcessor,
    queue: MediaQueue,
    rx: mpsc::Receiver<String>,
}

impl Service {
    /// Opens storage, seeds instances and wires the pipeline together.
    async fn build(
        config: RelaydeskConfig,
        prometheus: Option<Arc<PrometheusAdapter>>,
    ) -> Result<Self, RelaydeskError> {
        let sqlite = SqliteStorage::new(config.storage.clone());
        sqlite.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(sqlite);
        info!(path = %config.storage.database_path, "storage initialized");

        let seeded = relaydesk_ingest::seed_instances(storage.as_ref(), &config.instances).await?;
        if seeded == 0 {
            warn!("no [[instances]] configured, every webhook will be unroutable");
        } else {
            info!(count = seeded, "channel instances registered");
        }

        let registry = Arc::new(relaydesk_whatsapp::build_registry(
            &config.providers,
            Duration::from_secs(config.outbound.send_timeout_secs),
        )?);
        info!(
            available = ?registry.names(),
            active = %registry.current_name(),
            "provider registry ready"
        );

        let (queue, rx) = MediaQueue::bounded(config.media.queue_capacity);
        let processor = MediaProcessor::new(Arc::clone(&storage), &config.media)?;
        let pipeline = WebhookPipeline::new(Arc::clone(&storage), queue.clone());
        let media = MediaService::new(Arc::clone(&storage), queue.clone());
        let outbound = OutboundService::new(
            Arc::clone(&storage),
            Arc::clone(&registry),
            RetryPolicy::from(&config.outbound),
        );

        if config.server.bearer_token.is_none() {
            warn!("server.bearer_token is not set, the /v1 operator API will reject every request");
        }

        let prometheus_render = prometheus.map(|adapter| {
            Arc::new(move || adapter.render()) as Arc<dyn Fn() -> String + Send + Sync>
        });
        let state = GatewayState {
            storage: Arc::clone(&storage),
            registry: Arc::clone(&registry),
            pipeline,
            outbound,
            media,
            auth: AuthConfig {
                bearer_token: config.server.bearer_token.clone(),
            },
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render,
            },
        };

        Ok(Self {
            config,
            storage,
            registry,
            state,
            processor,
            queue,
            rx,
        })
    }

    /// Serves until `cancel` fires, then drains workers and closes storage.
    async fn run(self, cancel: CancellationToken) -> Result<(), RelaydeskError> {
        let Service {
            config,
            storage,
            registry,
            state,
            processor,
            queue,
            rx,
        } = self;

        relaydesk_ingest::media::fail_interrupted(storage.as_ref()).await?;
        let workers = MediaWorkers::start(processor, queue, rx, &config.media, cancel.clone());

        let served = relaydesk_gateway::start_server(&config.server, state, cancel.clone()).await;
        // A bind failure returns before any signal; stop the workers either way.
        cancel.cancel();

        info!("waiting for media workers to finish");
        workers.join().await;
        registry.shutdown_all().await;
        storage.close().await?;

        served
    }
}

/// Runs the service until SIGINT or SIGTERM.
pub async fn run_serve(config: RelaydeskConfig) -> Result<(), RelaydeskError> {
    init_tracing(&config.log.level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        active_provider = %config.providers.active,
        "starting relaydesk"
    );

    // Metrics recorder goes in first so startup counters are captured.
    let prometheus = if config.prometheus.enabled {
        Some(Arc::new(PrometheusAdapter::new()?))
    } else {
        info!("prometheus metrics disabled");
        None
    };

    let service = Service::build(config, prometheus).await?;
    let cancel = shutdown::install_signal_handler();
    service.run(cancel).await?;

    info!("relaydesk serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relaydesk={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
