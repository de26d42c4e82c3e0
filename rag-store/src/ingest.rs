//! Document ingestion: split markdown → embed passages → insert into the
//! vector store.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    embed::Embedder,
    errors::RagError,
    split::split_markdown,
    vector_store::{VectorStore, check_batch},
};

/// Outcome of one document ingestion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestReport {
    pub filename: String,
    /// Chunks written to the vector store.
    pub chunks: u64,
    /// Distinct sections among those chunks.
    pub sections: usize,
}

/// Splits `text` into chunks of at most `max_tokens`, embeds them as
/// passages and stores them under `filename`.
///
/// A document with no usable text yields an empty report without touching
/// the embedder or the store.
///
/// # Errors
/// Embedding or store failures, and [`RagError::BatchMismatch`] when the
/// embedder returns a different number of vectors than chunks.
pub async fn ingest_markdown(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    filename: &str,
    text: &str,
    max_tokens: usize,
) -> Result<IngestReport, RagError> {
    let records = split_markdown(text, filename, max_tokens);
    let sections = records
        .iter()
        .map(|r| r.section.as_str())
        .collect::<HashSet<_>>()
        .len();
    debug!(%filename, chunks = records.len(), sections, "document split");

    if records.is_empty() {
        return Ok(IngestReport {
            filename: filename.to_string(),
            chunks: 0,
            sections: 0,
        });
    }

    let passages: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let vectors = embedder.embed_passages(&passages).await?;
    check_batch(&records, &vectors)?;

    let chunks = store.insert(&records, &vectors).await?;
    info!(%filename, chunks, sections, "document ingested");
    Ok(IngestReport {
        filename: filename.to_string(),
        chunks,
        sections,
    })
}
