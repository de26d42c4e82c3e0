use async_trait::async_trait;

use crate::errors::RagError;

/// Cross-encoder scoring of `(query, passage)` pairs.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One relevance score per passage, in input order.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RagError>;

    /// True when the reranking server answers its health route.
    async fn health(&self) -> bool;
}

pub mod geo_reranker;
