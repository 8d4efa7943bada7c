// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `relaydesk status` command implementation.
//!
//! Queries the gateway health endpoint of a running instance and, when a
//! bearer token is configured, the media pipeline counters. Falls back
//! gracefully when the service is not running.

use std::io::IsTerminal;
use std::time::Duration;

use relaydesk_config::model::RelaydeskConfig;
use relaydesk_core::RelaydeskError;
use serde::{Deserialize, Serialize};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
    provider: String,
}

/// Media counters from `/v1/stats/media`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MediaCounts {
    pub received: i64,
    pub downloading: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub provider: Option<String>,
    pub media: Option<MediaCounts>,
    pub gateway_host: String,
    pub gateway_port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Address to reach a gateway bound to `bind_address`.
fn probe_host(bind_address: &str) -> &str {
    match bind_address {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    }
}

/// Collects the status of the instance described by `config`.
pub async fn fetch_status(config: &RelaydeskConfig) -> Result<StatusResponse, RelaydeskError> {
    let host = probe_host(&config.server.bind_address).to_string();
    let port = config.server.port;
    let base = format!("http://{host}:{port}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| RelaydeskError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(format!("{base}/health")).send().await {
        // 503 still carries a health body.
        Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 503 => {
            resp.json::<HealthResponse>().await.map_err(|e| {
                RelaydeskError::Internal(format!("failed to parse health response: {e}"))
            })?
        }
        _ => {
            return Ok(StatusResponse {
                running: false,
                status: "not running".to_string(),
                uptime_secs: None,
                uptime_human: None,
                provider: None,
                media: None,
                gateway_host: host,
                gateway_port: port,
            });
        }
    };

    let media = match &config.server.bearer_token {
        Some(token) => fetch_media_counts(&client, &base, token).await,
        None => None,
    };

    Ok(StatusResponse {
        running: true,
        uptime_human: Some(format_uptime(health.uptime_secs)),
        uptime_secs: Some(health.uptime_secs),
        status: health.status,
        provider: Some(health.provider),
        media,
        gateway_host: host,
        gateway_port: port,
    })
}

async fn fetch_media_counts(
    client: &reqwest::Client,
    base: &str,
    token: &str,
) -> Option<MediaCounts> {
    let resp = client
        .get(format!("{base}/v1/stats/media"))
        .bearer_auth(token)
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        tracing::debug!(status = %resp.status(), "media stats unavailable");
        return None;
    }
    resp.json().await.ok()
}

/// Run the `relaydesk status` command.
///
/// `--json` prints the structured response. `--plain`, or a stdout that is
/// not a TTY, disables colors.
pub async fn run_status(
    config: &RelaydeskConfig,
    json: bool,
    plain: bool,
) -> Result<(), RelaydeskError> {
    let status = fetch_status(config).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    if status.running {
        print_status_running(&status, use_color);
    } else {
        print_status_offline(&status.gateway_host, status.gateway_port, use_color);
    }
    Ok(())
}

/// Print running status with optional colors.
fn print_status_running(status: &StatusResponse, use_color: bool) {
    let uptime = status.uptime_human.as_deref().unwrap_or("-");
    println!();
    println!("  relaydesk status");
    println!("  {}", "-".repeat(35));

    let healthy = status.status == "ok";
    if use_color {
        use colored::Colorize;
        let state = if healthy {
            format!("{} {}", "✓".green(), status.status.green())
        } else {
            format!("{} {}", "!".yellow(), status.status.yellow())
        };
        println!("    State:    {state} (uptime: {uptime})");
    } else {
        let tag = if healthy { "[OK]" } else { "[WARN]" };
        println!("    State:    {tag} {} (uptime: {uptime})", status.status);
    }

    if let Some(provider) = &status.provider {
        println!("    Provider: {provider}");
    }
    if let Some(media) = &status.media {
        println!(
            "    Media:    {} total, {} pending, {} completed, {} failed",
            media.total,
            media.received + media.downloading + media.processing,
            media.completed,
            media.failed
        );
    }
    println!();
}

/// Print offline status with optional colors.
fn print_status_offline(host: &str, port: u16, use_color: bool) {
    println!();
    println!("  relaydesk status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!("    State:    {} {}", "✗".red(), "not running".red());
    } else {
        println!("    State:    [FAIL] not running");
    }

    println!("    Endpoint: http://{host}:{port}/health");
    println!();
    println!("  Start with: relaydesk serve");
    println!();
}
