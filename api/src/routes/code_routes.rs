use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use services::{ExecutionRecord, ExecutionRequest};
use tracing::debug;

use crate::{
    core::app_state::AppState, error_handler::AppResult,
    middleware_layer::error_envelope::request_id,
};

/// Handler: POST /code/execute
///
/// Replies immediately with the `running` record; poll
/// `GET /code/execution/{id}` for the outcome.
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> AppResult<Json<ExecutionRecord>> {
    let Json(req) = payload?;
    debug!(
        request_id = %request_id(&headers),
        language = %req.language,
        timeout = req.timeout,
        code_len = req.code.len(),
        "execute_code"
    );
    Ok(Json(state.sandbox.submit(req).await?))
}

/// Handler: GET /code/execution/{id}
pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ExecutionRecord>> {
    Ok(Json(state.sandbox.get(&id).await?))
}
