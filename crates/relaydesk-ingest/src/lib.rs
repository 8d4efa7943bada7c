// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The relaydesk ingestion pipeline.
//!
//! A webhook flows through [`WebhookPipeline`]: the provider adapter
//! authenticates and normalizes it, delivery callbacks go to the
//! [`StatusTracker`], and content messages are resolved to a tenant,
//! customer and conversation by the [`Resolver`] before a deduplicated
//! insert. Attachments are recorded synchronously and downloaded later by
//! the [`media`] workers. Outbound sends go through [`OutboundService`].

pub mod media;
pub mod outbound;
pub mod pipeline;
pub mod resolver;
pub mod status;

use relaydesk_config::model::InstanceConfig;
use relaydesk_core::types::{ChannelInstance, normalize_phone};
use relaydesk_core::{RelaydeskError, StorageAdapter};

pub use media::{JobOutcome, MediaProcessor, MediaQueue, MediaService, MediaWorkers};
pub use outbound::{OutboundContent, OutboundReceipt, OutboundRequest, OutboundService};
pub use pipeline::{WebhookOutcome, WebhookPipeline};
pub use resolver::{Resolution, ResolvedThread, Resolver};
pub use status::{StatusReport, StatusTracker};

/// Upserts the companies and provider instances named in configuration.
///
/// Idempotent; runs on every startup so config edits take effect.
pub async fn seed_instances(
    storage: &dyn StorageAdapter,
    instances: &[InstanceConfig],
) -> Result<usize, RelaydeskError> {
    for instance in instances {
        let name = instance
            .company_name
            .as_deref()
            .unwrap_or(&instance.company_id);
        storage.upsert_company(&instance.company_id, name).await?;
        storage
            .register_instance(&ChannelInstance {
                provider: instance.provider.clone(),
                instance_id: instance.instance_id.clone(),
                company_id: instance.company_id.clone(),
                phone: instance
                    .phone
                    .as_deref()
                    .map(normalize_phone)
                    .filter(|p| !p.is_empty()),
            })
            .await?;
        tracing::debug!(
            provider = %instance.provider,
            instance = %instance.instance_id,
            company = %instance.company_id,
            "channel instance registered"
        );
    }
    Ok(instances.len())
}

/// Current time in the storage timestamp format (`2026-01-01T00:00:00.000Z`).
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
