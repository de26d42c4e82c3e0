//! Vector database access behind one trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    errors::RagError,
    record::{ChunkFilter, ChunkRecord, RetrievedChunk},
};

pub mod qdrant;
pub mod zilliz;

/// Payload fields requested from the store for every hit.
pub const CHUNK_FIELDS: &[&str] = &[
    "text",
    "filename",
    "title",
    "section",
    "subsection",
    "page",
    "index",
];

/// Upper bound on chunks fetched for one document section.
pub const SECTION_FETCH_LIMIT: u32 = 1024;

/// Storage and similarity search over document chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `top_n` chunks ordered by descending cosine similarity.
    async fn search(
        &self,
        vector: Vec<f32>,
        top_n: u64,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<RetrievedChunk>, RagError>;

    /// Stores `records[i]` with `vectors[i]`; returns how many were written.
    ///
    /// # Errors
    /// [`RagError::BatchMismatch`] when the two slices differ in length,
    /// or any backend failure.
    async fn insert(&self, records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<u64, RagError>;

    /// Every stored chunk of `filename` whose section equals `section`
    /// (empty string for chunks outside any section), in no particular order.
    async fn section_chunks(
        &self,
        filename: &str,
        section: &str,
    ) -> Result<Vec<RetrievedChunk>, RagError>;

    /// True when the store answers and the collection exists.
    async fn health(&self) -> bool;
}

/// Rejects a batch whose records and vectors do not pair up.
pub(crate) fn check_batch(records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<(), RagError> {
    if records.len() != vectors.len() {
        return Err(RagError::BatchMismatch {
            records: records.len(),
            vectors: vectors.len(),
        });
    }
    Ok(())
}

/// Builds a chunk from a flat JSON payload; unknown/missing fields are tolerated.
pub(crate) fn chunk_from_payload(score: f32, payload: &Value) -> RetrievedChunk {
    let s = |k: &str| payload.get(k).and_then(Value::as_str).map(str::to_string);
    RetrievedChunk {
        text: s("text").unwrap_or_default(),
        filename: s("filename").unwrap_or_default(),
        title: s("title"),
        section: s("section"),
        subsection: s("subsection"),
        page: payload.get("page").and_then(loose_int),
        index: payload.get("index").and_then(loose_int),
        score,
    }
}

fn loose_int(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Stable descending order by score; NaN sorts last.
pub(crate) fn sort_by_score_desc(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or_else(|| a.score.is_nan().cmp(&b.score.is_nan()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_mapping_accepts_loose_page_types() {
        let c = chunk_from_payload(
            0.5,
            &json!({"text": "t", "filename": "f.pdf", "page": "12", "title": "T", "index": 4}),
        );
        assert_eq!(c.page, Some(12));
        assert_eq!(c.index, Some(4));
        assert_eq!(c.title.as_deref(), Some("T"));
        assert!(c.section.is_none());

        let c = chunk_from_payload(0.5, &json!({"page": 3.0}));
        assert_eq!(c.page, Some(3));
        assert_eq!(c.filename, "");
        assert!(c.index.is_none());
    }

    #[test]
    fn stored_payload_maps_back_to_a_chunk() {
        let rec = ChunkRecord {
            text: "The geoid.".into(),
            filename: "geodesy.md".into(),
            title: "Geodesy".into(),
            section: "Heights".into(),
            subsection: String::new(),
            index: 7,
        };
        let c = chunk_from_payload(0.0, &rec.payload());
        assert_eq!(c.text, "The geoid.");
        assert_eq!(c.section.as_deref(), Some("Heights"));
        assert_eq!(c.index, Some(7));
        assert!(c.page.is_none());
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let rec = ChunkRecord {
            text: "t".into(),
            filename: "f.md".into(),
            title: String::new(),
            section: String::new(),
            subsection: String::new(),
            index: 0,
        };
        assert!(check_batch(&[rec.clone()], &[vec![0.1]]).is_ok());
        assert!(matches!(
            check_batch(&[rec], &[]),
            Err(RagError::BatchMismatch {
                records: 1,
                vectors: 0
            })
        ));
    }
}
