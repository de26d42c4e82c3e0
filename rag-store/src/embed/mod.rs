use async_trait::async_trait;

use crate::errors::RagError;

/// Provider interface for embedding generation.
///
/// Implement this trait to plug in an embedding backend; the pipeline only
/// sees `dyn Embedder`, so tests can swap in fixed vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embeds passages in order; one vector per input.
    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// True when the embedding server answers its health route.
    async fn health(&self) -> bool;
}

pub mod geo_embedding;
