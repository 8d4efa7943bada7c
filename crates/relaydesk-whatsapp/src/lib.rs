// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp provider adapters for relaydesk.
//!
//! Two providers are supported behind the [`MessagingProvider`] trait:
//! Z-API ([`ZapiProvider`]) and Evolution API ([`EvolutionProvider`]).
//! [`ProviderRegistry`] holds every configured adapter and the currently
//! active one, which can be switched at runtime without a restart.

pub mod auth;
pub mod evolution;
mod http;
pub mod registry;
pub mod retry;
pub mod zapi;

use std::sync::Arc;
use std::time::Duration;

use relaydesk_config::model::ProvidersConfig;
use relaydesk_core::{MessagingProvider, RelaydeskError};

pub use evolution::EvolutionProvider;
pub use registry::ProviderRegistry;
pub use retry::{RetryPolicy, send_with_retry};
pub use zapi::ZapiProvider;

/// Builds a registry from every provider section present in the config.
///
/// `send_timeout` bounds each outbound HTTP call.
pub fn build_registry(
    config: &ProvidersConfig,
    send_timeout: Duration,
) -> Result<ProviderRegistry, RelaydeskError> {
    let mut providers: Vec<Arc<dyn MessagingProvider>> = Vec::new();
    if let Some(zapi) = &config.zapi {
        providers.push(Arc::new(ZapiProvider::new(zapi.clone(), send_timeout)?));
    }
    if let Some(evolution) = &config.evolution {
        providers.push(Arc::new(EvolutionProvider::new(
            evolution.clone(),
            send_timeout,
        )?));
    }
    ProviderRegistry::new(providers, &config.active)
}
