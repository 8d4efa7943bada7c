// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the operator REST API and public endpoints.

use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relaydesk_core::types::{ConversationStats, MediaRecord, MediaStats, MediaStatus};
use relaydesk_core::{HealthStatus, PluginAdapter, RelaydeskError};
use relaydesk_ingest::{OutboundContent, OutboundReceipt, OutboundRequest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::ApiError;
use crate::server::GatewayState;

const DEFAULT_MEDIA_LIMIT: i64 = 100;
const MAX_MEDIA_LIMIT: i64 = 1000;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, `degraded` or `unhealthy`.
    pub status: String,
    /// Binary version.
    pub version: String,
    pub uptime_secs: u64,
    /// Name of the active provider.
    pub provider: String,
    pub storage: String,
}

/// Request body for POST .../messages/text.
#[derive(Debug, Deserialize)]
pub struct TextMessageRequest {
    pub to: String,
    pub body: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub ai_metadata: Option<serde_json::Value>,
}

/// Request body for POST .../messages/media.
#[derive(Debug, Deserialize)]
pub struct MediaMessageRequest {
    pub to: String,
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Request body for POST .../messages/document.
#[derive(Debug, Deserialize)]
pub struct DocumentMessageRequest {
    pub to: String,
    pub url: String,
    pub file_name: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Request body for POST .../messages/file.
#[derive(Debug, Deserialize)]
pub struct FileMessageRequest {
    pub to: String,
    pub base64: String,
    pub mime_type: String,
    pub file_name: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Response body for the provider endpoints.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvidersResponse {
    pub current: String,
    pub available: Vec<String>,
}

/// Request body for PUT /v1/providers/current.
#[derive(Debug, Deserialize)]
pub struct SwitchProviderRequest {
    pub name: String,
}

/// Response body for GET /v1/stats/media.
#[derive(Debug, Serialize)]
pub struct MediaStatsResponse {
    #[serde(flatten)]
    pub counts: MediaStats,
    pub total: i64,
}

/// Query for GET /v1/media.
#[derive(Debug, Default, Deserialize)]
pub struct MediaListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Response body for GET /v1/media.
#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    pub media: Vec<MediaRecord>,
}

/// Request body for POST /v1/media/{id}/replay.
#[derive(Debug, Default, Deserialize)]
pub struct ReplayRequest {
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Request body for POST /v1/media/{id}/fail.
#[derive(Debug, Default, Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

fn health_label(status: &HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "ok",
        HealthStatus::Degraded(_) => "degraded",
        HealthStatus::Unhealthy(_) => "unhealthy",
    }
}

/// GET /health
///
/// 503 only when storage is unusable; a degraded provider still reports 200.
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let storage = state
        .storage
        .health_check()
        .await
        .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
    let provider = state.registry.current();
    let provider_health = provider
        .health_check()
        .await
        .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));

    let status = match (&storage, &provider_health) {
        (HealthStatus::Unhealthy(_), _) => "unhealthy",
        (HealthStatus::Healthy, HealthStatus::Healthy) => "ok",
        _ => "degraded",
    };
    let code = if matches!(storage, HealthStatus::Unhealthy(_)) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        provider: provider.name().to_string(),
        storage: health_label(&storage).to_string(),
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

async fn send(
    state: &GatewayState,
    company_id: &str,
    campaign_id: Option<&str>,
    request: OutboundRequest,
) -> Result<Json<OutboundReceipt>, ApiError> {
    request.validate().map_err(ApiError::BadRequest)?;
    let receipt = match campaign_id {
        Some(campaign_id) => {
            state
                .outbound
                .send_campaign(company_id, campaign_id, &request)
                .await?
        }
        None => state.outbound.send(company_id, &request).await?,
    };
    Ok(Json(receipt))
}

/// POST /v1/companies/{company_id}/messages/text
pub async fn post_text_message(
    State(state): State<GatewayState>,
    Path(company_id): Path<String>,
    Json(body): Json<TextMessageRequest>,
) -> Result<Json<OutboundReceipt>, ApiError> {
    let request = OutboundRequest {
        to: body.to,
        content: OutboundContent::Text { body: body.body },
        agent_id: body.agent_id,
        ai_metadata: body.ai_metadata,
    };
    send(&state, &company_id, None, request).await
}

/// POST /v1/companies/{company_id}/messages/media
pub async fn post_media_message(
    State(state): State<GatewayState>,
    Path(company_id): Path<String>,
    Json(body): Json<MediaMessageRequest>,
) -> Result<Json<OutboundReceipt>, ApiError> {
    let request = OutboundRequest {
        to: body.to,
        content: OutboundContent::Media {
            url: body.url,
            caption: body.caption,
        },
        agent_id: body.agent_id,
        ai_metadata: None,
    };
    send(&state, &company_id, None, request).await
}

/// POST /v1/companies/{company_id}/messages/document
pub async fn post_document_message(
    State(state): State<GatewayState>,
    Path(company_id): Path<String>,
    Json(body): Json<DocumentMessageRequest>,
) -> Result<Json<OutboundReceipt>, ApiError> {
    let request = OutboundRequest {
        to: body.to,
        content: OutboundContent::Document {
            url: body.url,
            file_name: body.file_name,
            caption: body.caption,
        },
        agent_id: body.agent_id,
        ai_metadata: None,
    };
    send(&state, &company_id, None, request).await
}

/// POST /v1/companies/{company_id}/messages/file
pub async fn post_file_message(
    State(state): State<GatewayState>,
    Path(company_id): Path<String>,
    Json(body): Json<FileMessageRequest>,
) -> Result<Json<OutboundReceipt>, ApiError> {
    let request = OutboundRequest {
        to: body.to,
        content: OutboundContent::File {
            base64: body.base64,
            mime_type: body.mime_type,
            file_name: body.file_name,
            caption: body.caption,
        },
        agent_id: body.agent_id,
        ai_metadata: None,
    };
    send(&state, &company_id, None, request).await
}

/// POST /v1/companies/{company_id}/campaigns/{campaign_id}/send
pub async fn post_campaign_message(
    State(state): State<GatewayState>,
    Path((company_id, campaign_id)): Path<(String, String)>,
    Json(request): Json<OutboundRequest>,
) -> Result<Json<OutboundReceipt>, ApiError> {
    send(&state, &company_id, Some(&campaign_id), request).await
}

/// GET /v1/companies/{company_id}/conversations/{conversation_id}/stats
pub async fn get_conversation_stats(
    State(state): State<GatewayState>,
    Path((company_id, conversation_id)): Path<(String, String)>,
) -> Result<Json<ConversationStats>, ApiError> {
    // Tenant check: another company's conversation is reported as missing.
    if state
        .storage
        .get_conversation(&company_id, &conversation_id)
        .await?
        .is_none()
    {
        return Err(RelaydeskError::not_found("conversation", conversation_id).into());
    }
    let stats = state
        .storage
        .conversation_stats(&company_id, &conversation_id)
        .await?;
    Ok(Json(stats))
}

fn providers(state: &GatewayState) -> ProvidersResponse {
    ProvidersResponse {
        current: state.registry.current_name(),
        available: state.registry.names(),
    }
}

/// GET /v1/providers
pub async fn get_providers(State(state): State<GatewayState>) -> Json<ProvidersResponse> {
    Json(providers(&state))
}

/// PUT /v1/providers/current
pub async fn put_current_provider(
    State(state): State<GatewayState>,
    Json(body): Json<SwitchProviderRequest>,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let previous = state.registry.current_name();
    state.registry.switch(body.name.trim())?;
    tracing::info!(from = %previous, to = %body.name.trim(), "active provider switched");
    Ok(Json(providers(&state)))
}

/// GET /v1/stats/media
pub async fn get_media_stats(
    State(state): State<GatewayState>,
) -> Result<Json<MediaStatsResponse>, ApiError> {
    let counts = state.storage.media_stats().await?;
    let total = counts.total();
    Ok(Json(MediaStatsResponse { counts, total }))
}

/// GET /v1/media?status=&limit=
pub async fn list_media(
    State(state): State<GatewayState>,
    Query(query): Query<MediaListQuery>,
) -> Result<Json<MediaListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            MediaStatus::from_str(&s.to_ascii_lowercase())
                .map_err(|_| ApiError::BadRequest(format!("unknown media status: {s}")))
        })
        .transpose()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MEDIA_LIMIT)
        .clamp(1, MAX_MEDIA_LIMIT);
    let media = state.storage.list_media(status, limit).await?;
    Ok(Json(MediaListResponse { media }))
}

/// GET /v1/media/{media_id}
pub async fn get_media(
    State(state): State<GatewayState>,
    Path(media_id): Path<String>,
) -> Result<Json<MediaRecord>, ApiError> {
    state
        .storage
        .get_media(&media_id)
        .await?
        .map(Json)
        .ok_or_else(|| RelaydeskError::not_found("media", media_id).into())
}

/// Parses an optional JSON body; an empty body yields the default.
fn optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

/// POST /v1/media/{media_id}/replay
pub async fn post_media_replay(
    State(state): State<GatewayState>,
    Path(media_id): Path<String>,
    body: Bytes,
) -> Result<Json<MediaRecord>, ApiError> {
    let request: ReplayRequest = optional_body(&body)?;
    let source_url = request.source_url.filter(|u| !u.trim().is_empty());
    let record = state.media.replay(&media_id, source_url.as_deref()).await?;
    Ok(Json(record))
}

/// POST /v1/media/{media_id}/fail
pub async fn post_media_fail(
    State(state): State<GatewayState>,
    Path(media_id): Path<String>,
    body: Bytes,
) -> Result<Json<MediaRecord>, ApiError> {
    let request: FailRequest = optional_body(&body)?;
    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "marked failed by operator".to_string());
    let record = state.media.mark_failed(&media_id, &reason).await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_request_deserializes_with_optional_fields() {
        let req: TextMessageRequest =
            serde_json::from_str(r#"{"to": "5511888888888", "body": "Hi"}"#).unwrap();
        assert_eq!(req.body, "Hi");
        assert!(req.agent_id.is_none());
        assert!(req.ai_metadata.is_none());
    }

    #[test]
    fn optional_body_accepts_empty_and_json() {
        let empty: ReplayRequest = optional_body(b"").unwrap();
        assert!(empty.source_url.is_none());
        let given: ReplayRequest =
            optional_body(br#"{"source_url": "https://cdn.example/x"}"#).unwrap();
        assert_eq!(given.source_url.as_deref(), Some("https://cdn.example/x"));
        assert!(optional_body::<FailRequest>(b"{not json").is_err());
    }

    #[test]
    fn media_stats_response_flattens_counts() {
        let mut counts = MediaStats::default();
        counts.add(MediaStatus::Completed, 3);
        counts.add(MediaStatus::Failed, 1);
        let json = serde_json::to_value(MediaStatsResponse {
            total: counts.total(),
            counts,
        })
        .unwrap();
        assert_eq!(json["completed"], 3);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["total"], 4);
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
            provider: "zapi".to_string(),
            storage: "ok".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
        assert!(json.contains("\"provider\":\"zapi\""));
    }
}
