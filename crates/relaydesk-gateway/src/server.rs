// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use relaydesk_config::model::ServerConfig;
use relaydesk_core::{RelaydeskError, StorageAdapter};
use relaydesk_ingest::{MediaService, OutboundService, WebhookPipeline};
use relaydesk_whatsapp::ProviderRegistry;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::webhooks;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub storage: Arc<dyn StorageAdapter>,
    pub registry: Arc<ProviderRegistry>,
    pub pipeline: WebhookPipeline,
    pub outbound: OutboundService,
    pub media: MediaService,
    /// Authentication configuration for `/v1`.
    pub auth: AuthConfig,
    /// Health state for unauthenticated endpoints.
    pub health: HealthState,
}

/// Builds the application router.
///
/// - `POST /webhooks/{provider}`, `POST /webhooks` (provider-authenticated)
/// - `/v1/...` operator API (bearer token)
/// - `GET /health`, `GET /metrics` (public)
pub fn build_router(config: &ServerConfig, state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public routes (health + metrics for systemd and Prometheus).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    // Provider callbacks; each adapter authenticates its own payloads.
    let webhook_routes = Router::new()
        .route("/webhooks", post(webhooks::post_active_webhook))
        .route("/webhooks/{provider}", post(webhooks::post_provider_webhook))
        .with_state(state.clone());

    // Routes requiring authentication.
    let mut api_routes = Router::new()
        .route(
            "/v1/companies/{company_id}/messages/text",
            post(handlers::post_text_message),
        )
        .route(
            "/v1/companies/{company_id}/messages/media",
            post(handlers::post_media_message),
        )
        .route(
            "/v1/companies/{company_id}/messages/document",
            post(handlers::post_document_message),
        )
        .route(
            "/v1/companies/{company_id}/messages/file",
            post(handlers::post_file_message),
        )
        .route(
            "/v1/companies/{company_id}/campaigns/{campaign_id}/send",
            post(handlers::post_campaign_message),
        )
        .route(
            "/v1/companies/{company_id}/conversations/{conversation_id}/stats",
            get(handlers::get_conversation_stats),
        )
        .route("/v1/providers", get(handlers::get_providers))
        .route("/v1/providers/current", put(handlers::put_current_provider))
        .route("/v1/stats/media", get(handlers::get_media_stats))
        .route("/v1/media", get(handlers::list_media))
        .route("/v1/media/{media_id}", get(handlers::get_media))
        .route("/v1/media/{media_id}/replay", post(handlers::post_media_replay))
        .route("/v1/media/{media_id}/fail", post(handlers::post_media_fail))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    if let Some(cors) = cors_layer(&config.cors_origins) {
        api_routes = api_routes.layer(cors);
    }

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the operator API; `None` when no origin is allowed.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}

/// Start the gateway HTTP server and serve until `shutdown` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), RelaydeskError> {
    let app = build_router(config, state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelaydeskError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| RelaydeskError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
