//! Retrieval-augmented generation for GeoGPT.
//!
//! Public API: [`RagPipeline`]. It embeds the question, recalls candidates
//! from the vector store, reranks them with the cross-encoder, packs the
//! top-K into a numbered context window, builds the citation prompt, calls
//! the LLM through the provider selector and returns the answer with its
//! citations, thinking trace and token accounting.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use contextor::{ChatRequest, PipelineConfig, RagPipeline};
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rag = rag_store::RagStore::from_env()?;
//! let llm = Arc::new(ai_llm_service::ProviderSelector::from_env()?);
//! let pipeline = RagPipeline::from_store(&rag, llm, None, PipelineConfig::from_env()?);
//! let answer = pipeline.chat(&ChatRequest::new("What is a geoid?")).await?;
//! println!("{}", answer.response);
//! # Ok(()) }
//! ```

mod api_types;
mod cfg;
mod error;
mod pipeline;
pub mod prompt;
pub mod web_search;

pub use api_types::{ChatAnswer, ChatMetadata, ChatRequest, SourceKind, SourceRef, TokenCounts};
pub use cfg::PipelineConfig;
pub use error::ContextorError;
pub use pipeline::RagPipeline;
pub use web_search::{CompositeWebSearch, WebSearch};
