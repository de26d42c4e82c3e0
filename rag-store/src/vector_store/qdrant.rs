//! Thin adapter around `qdrant-client` to isolate API usage.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, Filter, PointStruct, ScrollPointsBuilder, SearchParamsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QValue,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info, warn};

use crate::{
    config::QdrantConfig,
    errors::RagError,
    record::{ChunkFilter, ChunkRecord, RetrievedChunk},
    vector_store::{SECTION_FETCH_LIMIT, VectorStore, check_batch, chunk_from_payload},
};

/// A facade over the Qdrant client.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    exact: bool,
}

impl QdrantStore {
    /// Creates a new store; supports optional API key authentication.
    pub fn new(cfg: &QdrantConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&cfg.url);
        if let Some(key) = &cfg.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        info!(url = %cfg.url, collection = %cfg.collection, "QdrantStore initialized");
        Ok(Self {
            client,
            collection: cfg.collection.clone(),
            exact: cfg.exact_search,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(
        &self,
        vector: Vec<f32>,
        top_n: u64,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        debug!(
            collection = %self.collection,
            top_n,
            filtered = filter.is_some(),
            exact = self.exact,
            "qdrant search"
        );

        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector, top_n).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(to_qdrant_filter(f));
        }
        if self.exact {
            builder = builder.params(SearchParamsBuilder::default().exact(true));
        }

        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        // Qdrant already returns hits by descending score.
        let out: Vec<RetrievedChunk> = res
            .result
            .into_iter()
            .map(|p| chunk_from_payload(p.score, &qpayload_to_json(p.payload)))
            .collect();

        debug!(hits = out.len(), "qdrant search completed");
        Ok(out)
    }

    async fn insert(&self, records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<u64, RagError> {
        check_batch(records, vectors)?;
        if records.is_empty() {
            return Ok(0);
        }

        let points = records
            .iter()
            .zip(vectors)
            .map(|(rec, vector)| {
                let payload =
                    Payload::try_from(rec.payload()).map_err(|e| RagError::Qdrant(e.to_string()))?;
                Ok(PointStruct::new(
                    uuid::Uuid::new_v4().to_string(),
                    vector.clone(),
                    payload,
                ))
            })
            .collect::<Result<Vec<_>, RagError>>()?;

        info!(
            collection = %self.collection,
            points = points.len(),
            "qdrant upsert"
        );
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(records.len() as u64)
    }

    async fn section_chunks(
        &self,
        filename: &str,
        section: &str,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let res = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .filter(section_filter(filename, section))
                    .limit(SECTION_FETCH_LIMIT)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(res
            .result
            .into_iter()
            .map(|p| chunk_from_payload(0.0, &qpayload_to_json(p.payload)))
            .collect())
    }

    async fn health(&self) -> bool {
        match self.client.collection_info(&self.collection).await {
            Ok(_) => true,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "qdrant health check failed");
                false
            }
        }
    }
}

/// Any-of keyword match on `filename`.
fn to_qdrant_filter(f: &ChunkFilter) -> Filter {
    Filter::should(
        f.filenames
            .iter()
            .map(|name| Condition::matches("filename", name.clone()))
            .collect::<Vec<_>>(),
    )
}

/// Keyword match on both `filename` and `section`.
fn section_filter(filename: &str, section: &str) -> Filter {
    Filter::must([
        Condition::matches("filename", filename.to_string()),
        Condition::matches("section", section.to_string()),
    ])
}

/// Converts a Qdrant payload into JSON. Nested objects/lists map to `Null`.
fn qpayload_to_json(mut p: std::collections::HashMap<String, QValue>) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind as K;
    let mut m = serde_json::Map::new();
    for (k, v) in p.drain() {
        let j = match v.kind {
            Some(K::StringValue(s)) => serde_json::Value::String(s),
            Some(K::IntegerValue(i)) => serde_json::Value::Number(i.into()),
            Some(K::DoubleValue(f)) => serde_json::json!(f),
            Some(K::BoolValue(b)) => serde_json::Value::Bool(b),
            _ => serde_json::Value::Null,
        };
        m.insert(k, j);
    }
    serde_json::Value::Object(m)
}
