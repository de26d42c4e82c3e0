//! GET /config: effective configuration without credentials.

use std::sync::Arc;

use ai_llm_service::{LlmProvider, ProviderPreference};
use axum::{Json, extract::State};
use rag_store::VectorBackend;
use serde::Serialize;

use crate::core::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigReply {
    pub embedding_url: String,
    pub reranking_url: String,
    pub embedding_batch_size: usize,
    pub reranking_batch_size: usize,
    pub http_timeout_secs: u64,
    pub vector_store: VectorStoreConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Serialize)]
pub struct VectorStoreConfig {
    pub backend: &'static str,
    pub endpoint: String,
    pub collection: String,
    pub credentials_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct RetrievalConfig {
    pub recall_num: u64,
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub rerank_with_meta: bool,
    pub embedding_dim: Option<usize>,
    pub web_search_enabled: bool,
    pub web_max_results: usize,
}

#[derive(Debug, Serialize)]
pub struct LlmConfig {
    pub providers: Vec<LlmProvider>,
    pub primary: Option<LlmProvider>,
    pub default_preference: ProviderPreference,
}

/// Handler: GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigReply> {
    let rag = &state.rag.cfg;
    let (endpoint, credentials_configured) = match &rag.backend {
        VectorBackend::Zilliz(z) => (z.uri.clone(), z.token.is_some()),
        VectorBackend::Qdrant(q) => (q.url.clone(), q.api_key.is_some()),
    };
    let p = state.pipeline.config();
    let llm = state.llm();

    Json(ConfigReply {
        embedding_url: rag.embedding_url.clone(),
        reranking_url: rag.reranking_url.clone(),
        embedding_batch_size: rag.embedding_batch_size,
        reranking_batch_size: rag.reranking_batch_size,
        http_timeout_secs: rag.http_timeout_secs,
        vector_store: VectorStoreConfig {
            backend: rag.backend_name(),
            endpoint,
            collection: rag.collection().to_string(),
            credentials_configured,
        },
        retrieval: RetrievalConfig {
            recall_num: p.recall_num,
            top_k: p.top_k,
            score_threshold: p.score_threshold,
            rerank_with_meta: p.rerank_with_meta,
            embedding_dim: p.embedding_dim,
            web_search_enabled: p.web_search_enabled,
            web_max_results: p.web_max_results,
        },
        llm: LlmConfig {
            providers: llm.providers().await,
            primary: llm.primary().await,
            default_preference: llm.default_preference(),
        },
    })
}
