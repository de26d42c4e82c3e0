//! POST /kb/documents: adds a markdown document to the knowledge base.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use rag_store::IngestReport;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    core::app_state::AppState,
    error_handler::{AppError, AppResult},
    middleware_layer::error_envelope::request_id,
};

#[derive(Debug, Deserialize)]
pub struct IngestDocumentRequest {
    /// Name stored with every chunk; chat `context_files` filter on it.
    pub filename: String,
    /// Markdown text of the document.
    pub content: String,
}

/// Handler: POST /kb/documents
///
/// Splits the markdown into section-aware chunks, embeds them and writes them
/// to the vector store. Replies `201` with the chunk and section counts.
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8812/kb/documents \
///   -H 'content-type: application/json' \
///   -d '{"filename":"geoid_primer.md","content":"# Geoid\n## Heights\nThe geoid ..."}'
/// ```
pub async fn ingest_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<IngestDocumentRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<IngestReport>)> {
    let Json(req) = payload?;
    let request_id = request_id(&headers);

    let filename = req.filename.trim();
    if filename.is_empty() {
        return Err(AppError::BadRequest {
            message: "filename must not be empty".into(),
            path: Some("filename".into()),
        });
    }
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest {
            message: "content must not be empty".into(),
            path: Some("content".into()),
        });
    }

    let report = state
        .rag
        .ingest_markdown(filename, &req.content)
        .await
        .inspect_err(|e| warn!(request_id = %request_id, %filename, error = %e, "ingest: failed"))?;

    info!(
        request_id = %request_id,
        filename = %report.filename,
        chunks = report.chunks,
        sections = report.sections,
        "ingest: stored"
    );
    Ok((StatusCode::CREATED, Json(report)))
}
