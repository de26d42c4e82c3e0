//! Deep Discovery session routes.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use deep_discovery::{DiscoveryRequest, DiscoverySession, DiscoveryStarted, DiscoveryStatus};
use serde::Serialize;
use tracing::debug;

use crate::{
    core::app_state::AppState, error_handler::AppResult,
    middleware_layer::error_envelope::request_id,
};

/// Reply to pause and resume.
#[derive(Debug, Serialize)]
pub struct DiscoveryStatusReply {
    pub discovery_id: String,
    pub status: DiscoveryStatus,
}

/// Handler: POST /discovery/start
pub async fn start_discovery(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DiscoveryRequest>, JsonRejection>,
) -> AppResult<Json<DiscoveryStarted>> {
    let Json(req) = payload?;
    debug!(
        request_id = %request_id(&headers),
        query = %req.query,
        max_steps = req.max_steps,
        "start_discovery"
    );
    Ok(Json(state.discovery.start(req).await?))
}

/// Handler: GET /discovery
pub async fn list_discoveries(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<DiscoverySession>>> {
    Ok(Json(state.discovery.list().await?))
}

/// Handler: GET /discovery/{id}
pub async fn get_discovery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<DiscoverySession>> {
    Ok(Json(state.discovery.get(&id).await?))
}

/// Handler: POST /discovery/{id}/pause
pub async fn pause_discovery(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<DiscoveryStatusReply>> {
    debug!(request_id = %request_id(&headers), discovery_id = %id, "pause_discovery");
    let status = state.discovery.pause(&id).await?;
    Ok(Json(DiscoveryStatusReply {
        discovery_id: id,
        status,
    }))
}

/// Handler: POST /discovery/{id}/resume
pub async fn resume_discovery(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<DiscoveryStatusReply>> {
    debug!(request_id = %request_id(&headers), discovery_id = %id, "resume_discovery");
    let status = state.discovery.resume(&id).await?;
    Ok(Json(DiscoveryStatusReply {
        discovery_id: id,
        status,
    }))
}
