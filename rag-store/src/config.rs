//! Runtime configuration for the retrieval clients, loaded from env.

use std::str::FromStr;

use crate::errors::RagError;

/// Zilliz Cloud / Milvus REST v2 settings.
#[derive(Clone, Debug)]
pub struct ZillizConfig {
    /// Cluster URI, e.g. `https://in03-xxx.serverless.gcp-us-west1.cloud.zilliz.com`.
    pub uri: String,
    /// API key or `user:password`.
    pub token: Option<String>,
    pub collection: String,
    /// Name of the vector field searched against.
    pub vector_field: String,
}

/// Qdrant settings.
#[derive(Clone, Debug)]
pub struct QdrantConfig {
    /// gRPC endpoint, e.g. `http://localhost:6334`.
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    /// Exact search flag (false = HNSW ANN).
    pub exact_search: bool,
}

/// Which vector database backs retrieval.
#[derive(Clone, Debug)]
pub enum VectorBackend {
    Zilliz(ZillizConfig),
    Qdrant(QdrantConfig),
}

/// Configuration for the embedding server, reranker and vector store.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub embedding_url: String,
    pub reranking_url: String,
    pub embedding_batch_size: usize,
    pub reranking_batch_size: usize,
    /// Prefix passages with `title,section,subsection` before reranking.
    pub rerank_with_meta: bool,
    /// Expected embedding dimension; unchecked when `None`.
    pub embedding_dim: Option<usize>,
    /// Timeout for model-server and REST calls.
    pub http_timeout_secs: u64,
    /// Token budget of one ingested chunk.
    pub chunk_max_tokens: usize,
    pub backend: VectorBackend,
}

impl RagConfig {
    /// Reads every knob from the environment with the service defaults.
    ///
    /// # Errors
    /// `RagError::Config` for unparsable numbers, an unknown `VECTOR_BACKEND`,
    /// or a missing `ZILLIZ_URI` when the Zilliz backend is selected.
    pub fn from_env() -> Result<Self, RagError> {
        let backend = match env("VECTOR_BACKEND", "zilliz").to_ascii_lowercase().as_str() {
            "zilliz" | "milvus" => VectorBackend::Zilliz(ZillizConfig {
                uri: opt("ZILLIZ_URI").ok_or_else(|| {
                    RagError::Config("ZILLIZ_URI is required for the zilliz backend".into())
                })?,
                token: opt("ZILLIZ_TOKEN"),
                collection: env("ZILLIZ_COLLECTION", "geodocs"),
                vector_field: env("ZILLIZ_VECTOR_FIELD", "vector"),
            }),
            "qdrant" => VectorBackend::Qdrant(QdrantConfig {
                url: env("QDRANT_URL", "http://127.0.0.1:6334"),
                api_key: opt("QDRANT_API_KEY"),
                collection: env("QDRANT_COLLECTION", "geodocs"),
                exact_search: parse("RAG_EXACT_SEARCH", false)?,
            }),
            other => {
                return Err(RagError::Config(format!(
                    "unsupported VECTOR_BACKEND '{other}' (expected zilliz or qdrant)"
                )));
            }
        };

        let cfg = Self {
            embedding_url: env("EMBEDDING_URL", "http://localhost:8810"),
            reranking_url: env("RERANKING_URL", "http://localhost:8811"),
            embedding_batch_size: parse("EMBEDDING_BATCH_SIZE", 32usize)?,
            reranking_batch_size: parse("RERANKING_BATCH_SIZE", 32usize)?,
            rerank_with_meta: parse("RERANK_WITH_META", true)?,
            embedding_dim: opt("EMBEDDING_DIM")
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .map_err(|_| RagError::Config("EMBEDDING_DIM must be an integer".into()))
                })
                .transpose()?,
            http_timeout_secs: parse("RAG_HTTP_TIMEOUT_SECS", 60u64)?,
            chunk_max_tokens: parse("CHUNK_MAX_TOKENS", 512usize)?,
            backend,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        for (name, url) in [
            ("EMBEDDING_URL", &self.embedding_url),
            ("RERANKING_URL", &self.reranking_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RagError::Config(format!("{name} must be an http(s) URL")));
            }
        }
        if self.embedding_batch_size == 0 || self.reranking_batch_size == 0 {
            return Err(RagError::Config("batch sizes must be > 0".into()));
        }
        if self.chunk_max_tokens == 0 {
            return Err(RagError::Config("CHUNK_MAX_TOKENS must be > 0".into()));
        }
        match &self.backend {
            VectorBackend::Zilliz(z) if z.collection.trim().is_empty() => {
                Err(RagError::Config("ZILLIZ_COLLECTION is empty".into()))
            }
            VectorBackend::Qdrant(q) if q.collection.trim().is_empty() => {
                Err(RagError::Config("QDRANT_COLLECTION is empty".into()))
            }
            _ => Ok(()),
        }
    }

    /// Human-readable backend name for health/config reporting.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            VectorBackend::Zilliz(_) => "zilliz",
            VectorBackend::Qdrant(_) => "qdrant",
        }
    }

    /// Collection searched by the configured backend.
    pub fn collection(&self) -> &str {
        match &self.backend {
            VectorBackend::Zilliz(z) => &z.collection,
            VectorBackend::Qdrant(q) => &q.collection,
        }
    }
}

fn opt(k: &str) -> Option<String> {
    std::env::var(k).ok().filter(|v| !v.trim().is_empty())
}

fn env(k: &str, dflt: &str) -> String {
    opt(k).unwrap_or_else(|| dflt.to_string())
}

fn parse<T: FromStr>(k: &str, dflt: T) -> Result<T, RagError> {
    match opt(k) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| RagError::Config(format!("{k} has an invalid value: '{v}'"))),
        None => Ok(dflt),
    }
}
