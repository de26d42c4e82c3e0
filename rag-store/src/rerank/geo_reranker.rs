//! HTTP client for the GeoGPT reranking server.
//!
//! `POST {base}/query {"qp_pairs": [[q, p], ..]}` → `{"pred_scores": ..}`
//! where `pred_scores` is a float, a list of floats, or either of those
//! JSON-encoded inside a string.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::RagConfig,
    errors::{RagError, status_error},
    rerank::Reranker,
};

const SERVICE: &str = "reranking server";

#[derive(Clone, Debug)]
pub struct GeoRerankClient {
    http: reqwest::Client,
    base: String,
    batch_size: usize,
}

impl GeoRerankClient {
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(RagError::http(SERVICE))?;
        Ok(Self {
            http,
            base: cfg.reranking_url.trim_end_matches('/').to_string(),
            batch_size: cfg.reranking_batch_size,
        })
    }

    async fn score_batch(&self, pairs: &[[&str; 2]]) -> Result<Vec<f32>, RagError> {
        let url = format!("{}/query", self.base);
        let resp = self
            .http
            .post(&url)
            .json(&RerankRequest { qp_pairs: pairs })
            .send()
            .await
            .map_err(RagError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }
        let out: RerankResponse = resp.json().await.map_err(|e| RagError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        let scores = decode_scores(out.pred_scores)?;
        if scores.len() != pairs.len() {
            return Err(RagError::ScoreCountMismatch {
                got: scores.len(),
                want: pairs.len(),
            });
        }
        Ok(scores)
    }
}

#[async_trait]
impl Reranker for GeoRerankClient {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RagError> {
        let mut out = Vec::with_capacity(passages.len());
        for batch in passages.chunks(self.batch_size) {
            let pairs: Vec<[&str; 2]> = batch.iter().map(|p| [query, p.as_str()]).collect();
            out.extend(self.score_batch(&pairs).await?);
        }
        debug!(pairs = out.len(), "reranking completed");
        Ok(out)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base);
        match self.http.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                warn!(error = %e, %url, "reranking server health check failed");
                false
            }
        }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    qp_pairs: &'a [[&'a str; 2]],
}

#[derive(Deserialize)]
struct RerankResponse {
    pred_scores: Value,
}

fn decode_scores(raw: Value) -> Result<Vec<f32>, RagError> {
    let value = match raw {
        Value::String(s) => serde_json::from_str::<Value>(&s).map_err(|e| RagError::Decode {
            service: SERVICE,
            reason: format!("pred_scores string is not JSON: {e}"),
        })?,
        other => other,
    };

    let as_f32 = |v: &Value| -> Result<f32, RagError> {
        v.as_f64().map(|f| f as f32).ok_or_else(|| RagError::Decode {
            service: SERVICE,
            reason: format!("non-numeric score: {v}"),
        })
    };

    match &value {
        Value::Array(items) => items.iter().map(as_f32).collect(),
        Value::Number(_) => Ok(vec![as_f32(&value)?]),
        other => Err(RagError::Decode {
            service: SERVICE,
            reason: format!("unexpected pred_scores: {other}"),
        }),
    }
}
