//! Request handlers for the control surface.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;

use super::ApiState;
use crate::events::filtered_stream;

/// Handler error: logged server-side, opaque to the client.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!("api error: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal error"})),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn parse_iso_ms(raw: &str) -> Result<i64, ApiError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| ApiError(anyhow::anyhow!("invalid timestamp {raw}: {e}")))
}

// --- hub archive ---

#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub task_id: String,
    pub hubs_queued: usize,
}

/// POST /api/hub-archive/probe: mark hubs for depth probing.
///
/// Probing itself runs in the crawler process (`probe-hub-depth`); this
/// endpoint stages the work and returns the task id to follow in the
/// event stream.
pub async fn start_probe(
    State(state): State<ApiState>,
    Json(request): Json<ProbeRequest>,
) -> Result<Json<ProbeResponse>, ApiError> {
    let limit = request.limit.unwrap_or(50);
    let hubs = state
        .storage
        .verified_hubs(request.host.as_deref(), limit)
        .await?;
    for hub in &hubs {
        state.storage.mark_mapping_pending(hub.id).await?;
    }
    Ok(Json(ProbeResponse {
        task_id: state.bus.task_id().to_string(),
        hubs_queued: hubs.len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TasksRequest {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// POST /api/hub-archive/tasks: turn candidate mappings into pending
/// probe tasks.
pub async fn generate_tasks(
    State(state): State<ApiState>,
    Json(request): Json<TasksRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let candidates = state
        .storage
        .candidate_mappings(request.limit.unwrap_or(100))
        .await?;
    let mut task_ids = Vec::new();
    for mapping in &candidates {
        state.storage.mark_mapping_pending(mapping.id).await?;
        task_ids.push(mapping.id);
    }
    Ok(Json(json!({ "taskIds": task_ids })))
}

/// GET /api/hub-archive/stats: archive coverage per host.
pub async fn archive_stats(
    State(state): State<ApiState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state.storage.hub_archive_stats().await?;
    let by_host: Vec<serde_json::Value> = rows
        .iter()
        .map(|(host, hubs, probed, max_depth)| {
            json!({
                "host": host,
                "verified_hubs": hubs,
                "depth_probed": probed,
                "max_depth": max_depth,
            })
        })
        .collect();
    let totals = json!({
        "verified_hubs": rows.iter().map(|r| r.1).sum::<i64>(),
        "depth_probed": rows.iter().map(|r| r.2).sum::<i64>(),
    });
    Ok(Json(json!({ "totals": totals, "byHost": by_host })))
}

#[derive(Debug, Deserialize)]
pub struct HubsQuery {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /api/hub-archive/hubs: list verified hubs.
pub async fn list_hubs(
    State(state): State<ApiState>,
    Query(query): Query<HubsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hubs = state
        .storage
        .verified_hubs(query.host.as_deref(), query.limit.unwrap_or(200))
        .await?;
    Ok(Json(json!({ "hubs": hubs })))
}

// --- downloads ---

/// GET /api/downloads/stats: global download stats.
pub async fn download_stats(
    State(state): State<ApiState>,
) -> Result<Json<crate::storage::DownloadStats>, ApiError> {
    Ok(Json(state.storage.download_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

/// GET /api/downloads/range?start=<iso>&end=<iso>
pub async fn download_range(
    State(state): State<ApiState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<crate::storage::WindowStats>, ApiError> {
    let start = parse_iso_ms(&query.start)?;
    let end = parse_iso_ms(&query.end)?;
    Ok(Json(state.storage.window_stats(start, end).await?))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub start: String,
    pub end: String,
    pub claimed: i64,
}

/// GET /api/downloads/verify: the anti-hallucination check comparing a
/// claimed download count against actual evidence rows.
pub async fn verify_downloads(
    State(state): State<ApiState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let start = parse_iso_ms(&query.start)?;
    let end = parse_iso_ms(&query.end)?;
    let actual = state.storage.count_verified(Some(start), Some(end)).await?;
    let discrepancy = query.claimed - actual;
    Ok(Json(json!({
        "valid": discrepancy == 0,
        "actual": actual,
        "claimed": query.claimed,
        "discrepancy": discrepancy,
    })))
}

// --- events ---

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Comma-separated event types; empty = all.
    #[serde(default)]
    pub types: String,
}

/// GET /api/events/stream: newline-delimited JSON of live events.
pub async fn event_stream(
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let types: Vec<String> = query
        .types
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let stream = filtered_stream(&state.bus, types).map(|record| {
        let mut line = serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        Ok::<_, std::convert::Infallible>(line)
    });

    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
