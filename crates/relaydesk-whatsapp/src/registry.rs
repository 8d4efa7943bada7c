// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of configured provider adapters and the active one.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use relaydesk_core::{MessagingProvider, PluginAdapter, RelaydeskError};
use tracing::info;

/// Every configured provider, keyed by adapter name, plus a lock-free handle
/// to the one currently serving `POST /webhooks` and outbound sends.
///
/// Readers call [`current`](Self::current) per request; a switch is visible
/// to the next request without blocking in-flight ones.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn MessagingProvider>>,
    current: ArcSwap<Arc<dyn MessagingProvider>>,
}

impl ProviderRegistry {
    /// Builds a registry with `active` selected.
    pub fn new(
        providers: Vec<Arc<dyn MessagingProvider>>,
        active: &str,
    ) -> Result<Self, RelaydeskError> {
        let providers: BTreeMap<String, Arc<dyn MessagingProvider>> = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        let initial = providers
            .get(active)
            .cloned()
            .ok_or_else(|| adapter_not_found(active))?;

        Ok(Self {
            providers,
            current: ArcSwap::from_pointee(initial),
        })
    }

    /// The active provider.
    pub fn current(&self) -> Arc<dyn MessagingProvider> {
        (**self.current.load()).clone()
    }

    /// Name of the active provider.
    pub fn current_name(&self) -> String {
        self.current.load().name().to_string()
    }

    /// A provider by adapter name, whether active or not.
    pub fn get(&self, name: &str) -> Option<Arc<dyn MessagingProvider>> {
        self.providers.get(name).cloned()
    }

    /// Names of every configured provider, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Makes `name` the active provider.
    pub fn switch(&self, name: &str) -> Result<(), RelaydeskError> {
        let next = self.get(name).ok_or_else(|| adapter_not_found(name))?;
        let previous = self.current_name();
        self.current.store(Arc::new(next));
        info!(from = %previous, to = name, "active provider switched");
        Ok(())
    }

    /// Shuts down every provider, logging failures.
    pub async fn shutdown_all(&self) {
        for (name, provider) in &self.providers {
            if let Err(e) = provider.shutdown().await {
                tracing::warn!(provider = %name, error = %e, "provider shutdown failed");
            }
        }
    }
}

fn adapter_not_found(name: &str) -> RelaydeskError {
    RelaydeskError::AdapterNotFound {
        adapter_type: "provider".into(),
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use relaydesk_config::model::{EvolutionConfig, ZapiConfig};

    use crate::{EvolutionProvider, ZapiProvider};

    fn registry(active: &str) -> Result<ProviderRegistry, RelaydeskError> {
        let zapi = ZapiProvider::new(
            ZapiConfig {
                base_url: "http://localhost".into(),
                instance_id: "I".into(),
                token: "T".into(),
                client_token: None,
                webhook_token: Some("w".into()),
            },
            Duration::from_secs(1),
        )?;
        let evolution = EvolutionProvider::new(
            EvolutionConfig {
                base_url: "http://localhost".into(),
                instance: "main".into(),
                api_key: "k".into(),
                webhook_api_key: None,
            },
            Duration::from_secs(1),
        )?;
        ProviderRegistry::new(vec![Arc::new(zapi), Arc::new(evolution)], active)
    }

    #[test]
    fn starts_on_configured_provider() {
        let reg = registry("evolution").unwrap();
        assert_eq!(reg.current_name(), "evolution");
        assert_eq!(reg.names(), vec!["evolution".to_string(), "zapi".to_string()]);
        assert!(reg.get("zapi").is_some());
        assert!(reg.get("twilio").is_none());
    }

    #[test]
    fn unknown_active_provider_is_rejected() {
        let err = registry("twilio").err().unwrap();
        assert!(matches!(err, RelaydeskError::AdapterNotFound { .. }));
    }

    #[test]
    fn switch_changes_current_and_rejects_unknown() {
        let reg = registry("zapi").unwrap();
        let before = reg.current();
        reg.switch("evolution").unwrap();
        assert_eq!(reg.current().name(), "evolution");
        // Handles taken before the switch keep working.
        assert_eq!(before.name(), "zapi");

        assert!(reg.switch("nope").is_err());
        assert_eq!(reg.current_name(), "evolution");
    }
}
