// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./relaydesk.toml` > `~/.config/relaydesk/relaydesk.toml`
//! > `/etc/relaydesk/relaydesk.toml` with environment variable overrides via the
//! `RELAYDESK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RelaydeskConfig;

/// Sections whose env vars map `RELAYDESK_<SECTION>_<KEY>` to `<section>.<key>`.
const ENV_SECTIONS: &[&str] = &[
    "log",
    "server",
    "storage",
    "media",
    "outbound",
    "prometheus",
];

/// Config file locations, lowest priority first.
pub fn config_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc/relaydesk/relaydesk.toml"),
        dirs::config_dir()
            .map(|d| d.join("relaydesk/relaydesk.toml"))
            .unwrap_or_default(),
        PathBuf::from("relaydesk.toml"),
    ]
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/relaydesk/relaydesk.toml` (system-wide)
/// 3. `~/.config/relaydesk/relaydesk.toml` (user XDG config)
/// 4. `./relaydesk.toml` (local directory)
/// 5. `RELAYDESK_*` environment variables
pub fn load_config() -> Result<RelaydeskConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RelaydeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelaydeskConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RelaydeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelaydeskConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(RelaydeskConfig::default()));
    for path in config_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config key.
///
/// Uses explicit section matching rather than splitting on `_`, because key
/// names themselves contain underscores: `RELAYDESK_SERVER_BEARER_TOKEN` must
/// become `server.bearer_token`, and `RELAYDESK_PROVIDERS_ZAPI_WEBHOOK_TOKEN`
/// must become `providers.zapi.webhook_token`.
pub fn map_env_key(key: &str) -> String {
    if let Some(rest) = key.strip_prefix("providers_") {
        for provider in ["zapi", "evolution"] {
            if let Some(field) = rest.strip_prefix(provider).and_then(|r| r.strip_prefix('_')) {
                return format!("providers.{provider}.{field}");
            }
        }
        return format!("providers.{rest}");
    }
    for section in ENV_SECTIONS {
        if let Some(field) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{field}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("RELAYDESK_").map(|key| map_env_key(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections_without_splitting_field_names() {
        assert_eq!(map_env_key("server_bearer_token"), "server.bearer_token");
        assert_eq!(map_env_key("media_max_download_bytes"), "media.max_download_bytes");
        assert_eq!(map_env_key("log_level"), "log.level");
    }

    #[test]
    fn provider_env_keys_map_to_nested_tables() {
        assert_eq!(
            map_env_key("providers_zapi_webhook_token"),
            "providers.zapi.webhook_token"
        );
        assert_eq!(
            map_env_key("providers_evolution_api_key"),
            "providers.evolution.api_key"
        );
        assert_eq!(map_env_key("providers_active"), "providers.active");
    }
}
