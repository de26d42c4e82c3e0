//! HTTP client for the GeoGPT embedding server.
//!
//! - `POST {base}/query   {"queries":  [..]}` → `{"q_embeddings": ..}`
//! - `POST {base}/passage {"passages": [..]}` → `{"q_embeddings": ..}`
//! - `GET  {base}/health`
//!
//! `q_embeddings` arrives either as a JSON array of vectors or as a string
//! holding that array JSON-encoded; both are accepted.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    config::RagConfig,
    embed::Embedder,
    errors::{RagError, status_error},
};

const SERVICE: &str = "embedding server";

/// Embedding server client.
#[derive(Clone, Debug)]
pub struct GeoEmbeddingClient {
    http: reqwest::Client,
    base: String,
    batch_size: usize,
    dim: Option<usize>,
}

impl GeoEmbeddingClient {
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(RagError::http(SERVICE))?;
        Ok(Self {
            http,
            base: cfg.embedding_url.trim_end_matches('/').to_string(),
            batch_size: cfg.embedding_batch_size,
            dim: cfg.embedding_dim,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/{route}", self.base);
        trace!(%url, "embedding request");

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(RagError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }
        let out: EmbeddingResponse = resp.json().await.map_err(|e| RagError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        let vectors = out.q_embeddings.into_vectors()?;
        self.check_dims(&vectors)?;
        Ok(vectors)
    }

    fn check_dims(&self, vectors: &[Vec<f32>]) -> Result<(), RagError> {
        if let Some(want) = self.dim {
            if let Some(bad) = vectors.iter().find(|v| v.len() != want) {
                return Err(RagError::VectorSizeMismatch {
                    got: bad.len(),
                    want,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for GeoEmbeddingClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let query = text.replace('\n', " ");
        let body = QueryRequest {
            queries: vec![query.as_str()],
        };
        let mut vectors = self.post("query", &body).await?;
        debug!(dim = vectors.first().map(Vec::len), "query embedded");
        if vectors.is_empty() {
            return Err(RagError::Decode {
                service: SERVICE,
                reason: "empty q_embeddings".into(),
            });
        }
        Ok(vectors.swap_remove(0))
    }

    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let cleaned: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();
        let mut out = Vec::with_capacity(cleaned.len());
        for batch in cleaned.chunks(self.batch_size) {
            let body = PassageRequest { passages: batch };
            let vectors = self.post("passage", &body).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::Decode {
                    service: SERVICE,
                    reason: format!("{} vectors for {} passages", vectors.len(), batch.len()),
                });
            }
            out.extend(vectors);
        }
        debug!(count = out.len(), "passages embedded");
        Ok(out)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base);
        match self.http.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                warn!(error = %e, %url, "embedding server health check failed");
                false
            }
        }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    queries: Vec<&'a str>,
}

#[derive(Serialize)]
struct PassageRequest<'a> {
    passages: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    q_embeddings: EncodedVectors,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EncodedVectors {
    Native(Vec<Vec<f32>>),
    Encoded(String),
}

impl EncodedVectors {
    fn into_vectors(self) -> Result<Vec<Vec<f32>>, RagError> {
        match self {
            EncodedVectors::Native(v) => Ok(v),
            EncodedVectors::Encoded(s) => {
                serde_json::from_str(&s).map_err(|e| RagError::Decode {
                    service: SERVICE,
                    reason: format!("q_embeddings string is not a vector list: {e}"),
                })
            }
        }
    }
}
