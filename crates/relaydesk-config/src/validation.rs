// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as the active provider being configured or instances pointing at a
//! known provider.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::RelaydeskConfig;

/// Provider names the workspace ships adapters for.
pub const KNOWN_PROVIDERS: &[&str] = &["zapi", "evolution"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RelaydeskConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let addr = config.server.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::validation("server.bind_address must not be empty"));
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "server.bind_address `{addr}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    if config.media.storage_dir.trim().is_empty() {
        errors.push(ConfigError::validation("media.storage_dir must not be empty"));
    }
    if config.media.workers == 0 {
        errors.push(ConfigError::validation("media.workers must be at least 1"));
    }
    if config.media.queue_capacity == 0 {
        errors.push(ConfigError::validation("media.queue_capacity must be at least 1"));
    }
    if config.media.download_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "media.download_timeout_secs must be at least 1",
        ));
    }

    if config.outbound.initial_backoff_ms > config.outbound.max_backoff_ms {
        errors.push(ConfigError::validation(format!(
            "outbound.initial_backoff_ms ({}) must not exceed outbound.max_backoff_ms ({})",
            config.outbound.initial_backoff_ms, config.outbound.max_backoff_ms
        )));
    }
    if config.outbound.send_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "outbound.send_timeout_secs must be at least 1",
        ));
    }

    let configured = config.providers.configured();
    if !KNOWN_PROVIDERS.contains(&config.providers.active.as_str()) {
        errors.push(ConfigError::validation(format!(
            "providers.active `{}` is not a known provider (expected one of: {})",
            config.providers.active,
            KNOWN_PROVIDERS.join(", ")
        )));
    } else if !configured.is_empty() && !configured.contains(&config.providers.active.as_str()) {
        errors.push(ConfigError::validation(format!(
            "providers.active is `{}` but [providers.{}] is not configured",
            config.providers.active, config.providers.active
        )));
    }

    if let Some(zapi) = &config.providers.zapi {
        if zapi.instance_id.trim().is_empty() {
            errors.push(ConfigError::validation(
                "providers.zapi.instance_id must not be empty",
            ));
        }
        if zapi.token.trim().is_empty() {
            errors.push(ConfigError::validation("providers.zapi.token must not be empty"));
        }
    }

    if let Some(evolution) = &config.providers.evolution {
        if evolution.base_url.trim().is_empty() {
            errors.push(ConfigError::validation(
                "providers.evolution.base_url must not be empty",
            ));
        }
        if evolution.api_key.trim().is_empty() {
            errors.push(ConfigError::validation(
                "providers.evolution.api_key must not be empty",
            ));
        }
    }

    let mut seen = HashSet::new();
    for (i, instance) in config.instances.iter().enumerate() {
        if !KNOWN_PROVIDERS.contains(&instance.provider.as_str()) {
            errors.push(ConfigError::validation(format!(
                "instances[{i}].provider `{}` is not a known provider",
                instance.provider
            )));
        }
        if instance.instance_id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "instances[{i}].instance_id must not be empty"
            )));
        }
        if instance.company_id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "instances[{i}].company_id must not be empty"
            )));
        }
        if !seen.insert((instance.provider.as_str(), instance.instance_id.as_str())) {
            errors.push(ConfigError::validation(format!(
                "duplicate instance `{}/{}` in [[instances]] array",
                instance.provider, instance.instance_id
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceConfig, ZapiConfig};

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    fn instance(provider: &str, id: &str) -> InstanceConfig {
        InstanceConfig {
            provider: provider.to_string(),
            instance_id: id.to_string(),
            company_id: "acme".to_string(),
            company_name: None,
            phone: None,
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&RelaydeskConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = RelaydeskConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn zero_workers_fails_validation() {
        let mut config = RelaydeskConfig::default();
        config.media.workers = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "media.workers"));
    }

    #[test]
    fn inverted_backoff_fails_validation() {
        let mut config = RelaydeskConfig::default();
        config.outbound.initial_backoff_ms = 10_000;
        config.outbound.max_backoff_ms = 100;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "initial_backoff_ms"));
    }

    #[test]
    fn active_provider_must_be_configured() {
        let mut config = RelaydeskConfig::default();
        config.providers.active = "evolution".to_string();
        config.providers.zapi = Some(ZapiConfig {
            base_url: "https://api.z-api.io".to_string(),
            instance_id: "inst".to_string(),
            token: "tok".to_string(),
            client_token: None,
            webhook_token: None,
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "[providers.evolution] is not configured"));
    }

    #[test]
    fn unknown_active_provider_fails_validation() {
        let mut config = RelaydeskConfig::default();
        config.providers.active = "twilio".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "not a known provider"));
    }

    #[test]
    fn duplicate_instances_fail_validation() {
        let mut config = RelaydeskConfig::default();
        config.instances = vec![instance("zapi", "i-1"), instance("zapi", "i-1")];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "duplicate instance `zapi/i-1`"));
    }

    #[test]
    fn same_instance_id_on_different_providers_is_fine() {
        let mut config = RelaydeskConfig::default();
        config.instances = vec![instance("zapi", "i-1"), instance("evolution", "i-1")];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = RelaydeskConfig::default();
        config.server.bind_address = "".to_string();
        config.media.workers = 0;
        config.media.queue_capacity = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn evolution_only_config_validates() {
        let toml_str = r#"
[providers]
active = "evolution"

[providers.evolution]
base_url = "https://evo.example"
instance = "acme-main"
api_key = "server-key"

[[instances]]
provider = "evolution"
instance_id = "acme-main"
company_id = "acme"
"#;
        let config: RelaydeskConfig = toml::from_str(toml_str).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.providers.configured(), vec!["evolution"]);
    }

    #[test]
    fn unknown_media_key_is_rejected() {
        let toml_str = r#"
[media]
worker = 4
"#;
        let result = toml::from_str::<RelaydeskConfig>(toml_str);
        assert!(result.is_err());
    }
}
