//! HTTP/JSON control surface.
//!
//! Read endpoints are thin adapters over the storage layer's SELECT-only
//! queries; the two POST endpoints enqueue background work and return
//! task ids. The event stream serves newline-delimited JSON filtered by
//! event type. Nothing here is evidence; `/api/downloads/verify` exists
//! precisely to check claims against `http_responses` rows.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::events::EventBus;
use crate::storage::Storage;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub storage: Storage,
    pub bus: Arc<EventBus>,
}

/// Build the API router.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/hub-archive/probe", post(handlers::start_probe))
        .route("/api/hub-archive/tasks", post(handlers::generate_tasks))
        .route("/api/hub-archive/stats", get(handlers::archive_stats))
        .route("/api/hub-archive/hubs", get(handlers::list_hubs))
        .route("/api/downloads/stats", get(handlers::download_stats))
        .route("/api/downloads/range", get(handlers::download_range))
        .route("/api/downloads/verify", get(handlers::verify_downloads))
        .route("/api/events/stream", get(handlers::event_stream))
        .with_state(state)
}

/// Serve the API until the listener fails or the task is aborted.
pub async fn serve(state: ApiState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("control surface listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
