//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for rag-store operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Transport failure talking to a model server or vector store.
    #[error("http error calling {service}: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Upstream answered 200 but the payload had an unexpected shape.
    #[error("unexpected {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    /// Mismatch in vector dimensionality.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Reranker returned a different number of scores than pairs sent.
    #[error("reranker returned {got} scores for {want} pairs")]
    ScoreCountMismatch { got: usize, want: usize },

    /// An insert batch paired a different number of vectors and records.
    #[error("{vectors} vectors for {records} records")]
    BatchMismatch { records: usize, vectors: usize },

    /// Qdrant client errors (wrapped).
    #[error("qdrant error: {0}")]
    Qdrant(String),
}

impl RagError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> RagError {
        move |source| RagError::Http { service, source }
    }
}

/// Reads a non-success response into [`RagError::UpstreamStatus`].
pub(crate) async fn status_error(service: &'static str, resp: reqwest::Response) -> RagError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.trim().chars().take(300).collect();
    RagError::UpstreamStatus {
        service,
        status,
        body,
    }
}
