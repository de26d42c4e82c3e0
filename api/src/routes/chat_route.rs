//! POST /chat: answers a question with knowledge base and web context.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use contextor::{ChatAnswer, ChatRequest};
use tracing::{debug, info, warn};

use crate::{
    core::app_state::AppState, error_handler::AppResult,
    middleware_layer::error_envelope::request_id,
};

/// Handler: POST /chat
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8812/chat \
///   -H 'content-type: application/json' \
///   -d '{"message":"What controls the geoid height?","include_thinking":true}'
/// ```
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<ChatAnswer>> {
    let Json(req) = payload?;
    let request_id = request_id(&headers);

    debug!(
        request_id = %request_id,
        message_len = req.message.len(),
        context_files = req.context_files.len(),
        use_web_search = req.use_web_search,
        "chat: start"
    );

    let answer = state.pipeline.chat(&req).await.inspect_err(|e| {
        warn!(request_id = %request_id, error = %e, "chat: failed");
    })?;

    info!(
        request_id = %request_id,
        provider = %answer.provider,
        sources = answer.sources.len(),
        tokens = answer.tokens.total,
        processing_time = answer.processing_time,
        "chat: answered"
    );

    Ok(Json(answer))
}
