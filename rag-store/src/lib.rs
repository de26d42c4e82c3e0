//! Retrieval building blocks for GeoGPT-RAG.
//!
//! This crate provides clients for the three retrieval collaborators:
//! - the embedding server ([`Embedder`], [`GeoEmbeddingClient`])
//! - the cross-encoder reranking server ([`Reranker`], [`GeoRerankClient`])
//! - the vector database ([`VectorStore`], [`ZillizStore`], [`QdrantStore`])
//!
//! plus the document side: markdown splitting ([`split_markdown`]),
//! ingestion ([`RagStore::ingest_markdown`]) and neighbour expansion of
//! retrieved chunks ([`expand_chunk`]).
//!
//! Each collaborator sits behind an object-safe trait so the orchestration
//! layer can be tested with in-memory fakes.

mod config;
mod embed;
mod errors;
mod expand;
mod ingest;
mod record;
mod rerank;
mod split;
mod vector_store;

use std::sync::Arc;

pub use config::{QdrantConfig, RagConfig, VectorBackend, ZillizConfig};
pub use embed::{Embedder, geo_embedding::GeoEmbeddingClient};
pub use errors::RagError;
pub use expand::expand_chunk;
pub use ingest::{IngestReport, ingest_markdown};
pub use record::{ChunkFilter, ChunkRecord, RetrievedChunk};
pub use rerank::{Reranker, geo_reranker::GeoRerankClient};
pub use split::{approx_tokens, split_markdown};
pub use vector_store::{VectorStore, qdrant::QdrantStore, zilliz::ZillizStore};

use tracing::{info, trace};

/// High-level facade that wires the configured clients together.
///
/// This is the single entry point recommended for application code; the
/// fields are trait objects so callers can pass them on independently.
#[derive(Clone)]
pub struct RagStore {
    pub cfg: RagConfig,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub store: Arc<dyn VectorStore>,
}

impl RagStore {
    /// Constructs every client from the given configuration.
    ///
    /// # Errors
    /// Returns `RagError::Config`/`RagError::Qdrant` if a client cannot be built.
    pub fn new(cfg: RagConfig) -> Result<Self, RagError> {
        trace!(backend = cfg.backend_name(), "RagStore::new");
        cfg.validate()?;

        let store: Arc<dyn VectorStore> = match &cfg.backend {
            VectorBackend::Zilliz(z) => Arc::new(ZillizStore::new(z, cfg.http_timeout_secs)?),
            VectorBackend::Qdrant(q) => Arc::new(QdrantStore::new(q)?),
        };
        let embedder: Arc<dyn Embedder> = Arc::new(GeoEmbeddingClient::new(&cfg)?);
        let reranker: Arc<dyn Reranker> = Arc::new(GeoRerankClient::new(&cfg)?);

        info!(
            embedding_url = %cfg.embedding_url,
            reranking_url = %cfg.reranking_url,
            backend = cfg.backend_name(),
            collection = cfg.collection(),
            "RagStore initialized"
        );

        Ok(Self {
            cfg,
            embedder,
            reranker,
            store,
        })
    }

    /// Convenience: [`RagConfig::from_env`] + [`RagStore::new`].
    pub fn from_env() -> Result<Self, RagError> {
        Self::new(RagConfig::from_env()?)
    }
}

impl RagStore {
    /// Splits, embeds and stores one markdown document using
    /// `cfg.chunk_max_tokens` as the chunk budget.
    ///
    /// # Errors
    /// See [`ingest_markdown`].
    pub async fn ingest_markdown(&self, filename: &str, text: &str) -> Result<IngestReport, RagError> {
        ingest_markdown(
            self.embedder.as_ref(),
            self.store.as_ref(),
            filename,
            text,
            self.cfg.chunk_max_tokens,
        )
        .await
    }
}
