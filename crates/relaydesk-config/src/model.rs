// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for relaydesk.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level relaydesk configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelaydeskConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Media download pipeline settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Outbound send retry settings.
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// WhatsApp provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Provider instances and the companies they belong to.
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP server configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port for webhooks and the operator API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for the `/v1` API. `None` rejects every `/v1` request.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Allowed CORS origins for the `/v1` API. Empty allows none.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .field("cors_origins", &self.cors_origins)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            bearer_token: None,
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("relaydesk").join("relaydesk.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("relaydesk.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Media download pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Root directory for downloaded files; one subdirectory per company.
    #[serde(default = "default_media_dir")]
    pub storage_dir: String,

    /// Number of concurrent download workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the in-memory job queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout for a single download.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Downloads larger than this fail.
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,

    /// Interval of the sweep that re-enqueues records stuck in `received`.
    /// Zero disables the periodic sweep; the startup sweep always runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_media_dir(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            download_timeout_secs: default_download_timeout_secs(),
            max_download_bytes: default_max_download_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_media_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("relaydesk").join("media"))
        .unwrap_or_else(|| std::path::PathBuf::from("media"))
        .to_string_lossy()
        .into_owned()
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_download_timeout_secs() -> u64 {
    60
}

fn default_max_download_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Outbound send configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutboundConfig {
    /// Retries after the first attempt for retryable failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay between retries.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout for provider send calls.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_send_timeout_secs() -> u64 {
    30
}

/// WhatsApp provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Provider that serves `POST /webhooks` and outbound sends at startup.
    #[serde(default = "default_active_provider")]
    pub active: String,

    /// Z-API settings. `None` disables the Z-API adapter.
    #[serde(default)]
    pub zapi: Option<ZapiConfig>,

    /// Evolution API settings. `None` disables the Evolution adapter.
    #[serde(default)]
    pub evolution: Option<EvolutionConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            active: default_active_provider(),
            zapi: None,
            evolution: None,
        }
    }
}

fn default_active_provider() -> String {
    "zapi".to_string()
}

impl ProvidersConfig {
    /// Names of the providers that have a configuration section.
    pub fn configured(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.zapi.is_some() {
            names.push("zapi");
        }
        if self.evolution.is_some() {
            names.push("evolution");
        }
        names
    }
}

/// Z-API adapter configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZapiConfig {
    /// Base URL of the Z-API service.
    #[serde(default = "default_zapi_base_url")]
    pub base_url: String,

    /// Z-API instance id used for outbound sends.
    pub instance_id: String,

    /// Instance token (part of the send URL path).
    pub token: String,

    /// Account security token sent as `Client-Token` on outbound calls.
    #[serde(default)]
    pub client_token: Option<String>,

    /// Secret expected in the `Client-Token` header of inbound webhooks.
    /// `None` rejects every webhook.
    #[serde(default)]
    pub webhook_token: Option<String>,
}

impl std::fmt::Debug for ZapiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZapiConfig")
            .field("base_url", &self.base_url)
            .field("instance_id", &self.instance_id)
            .field("token", &"[redacted]")
            .field("client_token", &self.client_token.as_ref().map(|_| "[redacted]"))
            .field("webhook_token", &self.webhook_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn default_zapi_base_url() -> String {
    "https://api.z-api.io".to_string()
}

/// Evolution API adapter configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    /// Base URL of the Evolution API server.
    pub base_url: String,

    /// Instance name used in send URLs.
    pub instance: String,

    /// API key sent as the `apikey` header on outbound calls.
    pub api_key: String,

    /// Secret expected in the `apikey` field of inbound webhook payloads.
    /// Falls back to `api_key` when unset.
    #[serde(default)]
    pub webhook_api_key: Option<String>,
}

impl std::fmt::Debug for EvolutionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionConfig")
            .field("base_url", &self.base_url)
            .field("instance", &self.instance)
            .field("api_key", &"[redacted]")
            .field(
                "webhook_api_key",
                &self.webhook_api_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl EvolutionConfig {
    /// Secret inbound webhooks must carry.
    pub fn webhook_secret(&self) -> &str {
        self.webhook_api_key.as_deref().unwrap_or(&self.api_key)
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}

/// A provider instance (connected WhatsApp number) owned by a company.
///
/// Seeded into storage at startup; the receiving instance of an inbound
/// event identifies the tenant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    /// Provider the instance lives on (`zapi` or `evolution`).
    pub provider: String,

    /// Provider-side instance identifier.
    pub instance_id: String,

    /// Owning company id.
    pub company_id: String,

    /// Display name for the company; defaults to the id.
    #[serde(default)]
    pub company_name: Option<String>,

    /// Connected business number, used when a webhook omits the instance id.
    #[serde(default)]
    pub phone: Option<String>,
}
