//! Zilliz Cloud / Milvus client over the REST v2 API.
//!
//! - `POST {uri}/v2/vectordb/entities/search`      similarity search
//! - `POST {uri}/v2/vectordb/entities/insert`      chunk ingestion
//! - `POST {uri}/v2/vectordb/entities/query`       scalar lookup of a section
//! - `POST {uri}/v2/vectordb/collections/describe` health check
//!
//! Every response carries `{"code": 0, ...}` on success; non-zero codes come
//! with a `message` and are mapped to [`RagError::UpstreamStatus`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    config::ZillizConfig,
    errors::{RagError, status_error},
    record::{ChunkFilter, ChunkRecord, RetrievedChunk},
    vector_store::{
        CHUNK_FIELDS, SECTION_FETCH_LIMIT, VectorStore, check_batch, chunk_from_payload,
        sort_by_score_desc,
    },
};

const SERVICE: &str = "zilliz";

pub struct ZillizStore {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
    collection: String,
    vector_field: String,
}

impl ZillizStore {
    pub fn new(cfg: &ZillizConfig, timeout_secs: u64) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(RagError::http(SERVICE))?;
        info!(collection = %cfg.collection, "ZillizStore initialized");
        Ok(Self {
            http,
            base: cfg.uri.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            collection: cfg.collection.clone(),
            vector_field: cfg.vector_field.clone(),
        })
    }

    async fn call(&self, route: &str, body: &Value) -> Result<Value, RagError> {
        let url = format!("{}{route}", self.base);
        let mut req = self.http.post(&url).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(RagError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }
        let envelope: RestEnvelope = resp.json().await.map_err(|e| RagError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        if envelope.code != 0 {
            return Err(RagError::UpstreamStatus {
                service: SERVICE,
                status: u16::try_from(envelope.code).unwrap_or(u16::MAX),
                body: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }

    fn search_body(&self, vector: Vec<f32>, top_n: u64, filter: Option<&ChunkFilter>) -> Value {
        let mut body = json!({
            "collectionName": self.collection,
            "data": [vector],
            "annsField": self.vector_field,
            "limit": top_n,
            "outputFields": CHUNK_FIELDS,
            "searchParams": { "metricType": "COSINE" },
        });
        if let (Some(f), Some(obj)) = (filter, body.as_object_mut()) {
            obj.insert("filter".into(), Value::String(filename_filter_expr(f)));
        }
        body
    }

    /// Rows are the chunk payload plus the vector under `vector_field`.
    fn insert_body(&self, records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Value {
        let rows: Vec<Value> = records
            .iter()
            .zip(vectors)
            .map(|(rec, vector)| {
                let mut row = rec.payload();
                if let Some(obj) = row.as_object_mut() {
                    obj.insert(self.vector_field.clone(), json!(vector));
                }
                row
            })
            .collect();
        json!({
            "collectionName": self.collection,
            "data": rows,
        })
    }

    fn section_body(&self, filename: &str, section: &str) -> Value {
        json!({
            "collectionName": self.collection,
            "filter": format!(
                "filename == {} and section == {}",
                Value::String(filename.to_string()),
                Value::String(section.to_string())
            ),
            "outputFields": CHUNK_FIELDS,
            "limit": SECTION_FETCH_LIMIT,
        })
    }
}

#[async_trait]
impl VectorStore for ZillizStore {
    async fn search(
        &self,
        vector: Vec<f32>,
        top_n: u64,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        debug!(collection = %self.collection, top_n, filtered = filter.is_some(), "zilliz search");
        let body = self.search_body(vector, top_n, filter);
        let data = self.call("/v2/vectordb/entities/search", &body).await?;
        let mut hits = parse_hits(data)?;
        sort_by_score_desc(&mut hits);
        debug!(hits = hits.len(), "zilliz search completed");
        Ok(hits)
    }

    async fn insert(&self, records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<u64, RagError> {
        check_batch(records, vectors)?;
        if records.is_empty() {
            return Ok(0);
        }
        let body = self.insert_body(records, vectors);
        let data = self.call("/v2/vectordb/entities/insert", &body).await?;
        let inserted = data
            .get("insertCount")
            .and_then(Value::as_u64)
            .unwrap_or(records.len() as u64);
        debug!(collection = %self.collection, inserted, "zilliz insert completed");
        Ok(inserted)
    }

    async fn section_chunks(
        &self,
        filename: &str,
        section: &str,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let body = self.section_body(filename, section);
        let data = self.call("/v2/vectordb/entities/query", &body).await?;
        parse_hits(data)
    }

    async fn health(&self) -> bool {
        let body = json!({ "collectionName": self.collection });
        match self.call("/v2/vectordb/collections/describe", &body).await {
            Ok(_) => true,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "zilliz health check failed");
                false
            }
        }
    }
}

#[derive(Deserialize)]
struct RestEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Search hits are flat objects: output fields plus `distance` (and `id`).
fn parse_hits(data: Value) -> Result<Vec<RetrievedChunk>, RagError> {
    let Value::Array(rows) = data else {
        return Err(RagError::Decode {
            service: SERVICE,
            reason: "result data is not a list".into(),
        });
    };
    Ok(rows
        .iter()
        .map(|row| {
            let score = row.get("distance").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            // Some deployments nest output fields under `entity`.
            let payload = match row.get("entity") {
                Some(Value::Object(inner)) => Value::Object(inner.clone()),
                _ => row.clone(),
            };
            chunk_from_payload(score, &payload)
        })
        .collect())
}

/// `filename in ["a.pdf", "b.pdf"]` with JSON string escaping.
fn filename_filter_expr(f: &ChunkFilter) -> String {
    let quoted: Vec<String> = f
        .filenames
        .iter()
        .map(|n| Value::String(n.clone()).to_string())
        .collect();
    format!("filename in [{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ZillizStore {
        ZillizStore {
            http: reqwest::Client::new(),
            base: "https://example.zilliz".into(),
            token: None,
            collection: "geodocs".into(),
            vector_field: "vector".into(),
        }
    }

    #[test]
    fn filter_expression_quotes_names() {
        let f = ChunkFilter {
            filenames: vec!["a.pdf".into(), "we\"ird.pdf".into()],
        };
        assert_eq!(
            filename_filter_expr(&f),
            r#"filename in ["a.pdf", "we\"ird.pdf"]"#
        );
    }

    #[test]
    fn search_body_includes_filter_only_when_given() {
        let s = store();
        let body = s.search_body(vec![0.1, 0.2], 128, None);
        assert_eq!(body["limit"], 128);
        assert_eq!(body["collectionName"], "geodocs");
        assert!(body.get("filter").is_none());

        let f = ChunkFilter {
            filenames: vec!["x.pdf".into()],
        };
        let body = s.search_body(vec![0.1], 5, Some(&f));
        assert_eq!(body["filter"], r#"filename in ["x.pdf"]"#);
    }

    #[test]
    fn hits_are_parsed_flat_or_nested() {
        let data = json!([
            {"id": 1, "distance": 0.4, "text": "b", "filename": "b.pdf"},
            {"id": 2, "distance": 0.9, "entity": {"text": "a", "filename": "a.pdf", "page": 2}}
        ]);
        let mut hits = parse_hits(data).unwrap();
        sort_by_score_desc(&mut hits);
        assert_eq!(hits[0].filename, "a.pdf");
        assert_eq!(hits[0].page, Some(2));
        assert_eq!(hits[1].text, "b");
    }

    #[test]
    fn insert_rows_carry_payload_and_vector() {
        let rec = ChunkRecord {
            text: "Heights above the geoid.".into(),
            filename: "geodesy.md".into(),
            title: "Geodesy".into(),
            section: "Heights".into(),
            subsection: String::new(),
            index: 2,
        };
        let body = store().insert_body(&[rec], &[vec![0.25, 0.5]]);
        assert_eq!(body["collectionName"], "geodocs");
        let row = &body["data"][0];
        assert_eq!(row["vector"], json!([0.25, 0.5]));
        assert_eq!(row["index"], 2);
        assert_eq!(row["section"], "Heights");
        assert_eq!(row["filename"], "geodesy.md");
    }

    #[test]
    fn section_query_matches_file_and_section() {
        let body = store().section_body("geo\"desy.md", "");
        assert_eq!(
            body["filter"],
            r#"filename == "geo\"desy.md" and section == """#
        );
        assert_eq!(body["limit"], SECTION_FETCH_LIMIT);
        assert!(
            body["outputFields"]
                .as_array()
                .unwrap()
                .iter()
                .any(|f| f == "index")
        );
    }
}
