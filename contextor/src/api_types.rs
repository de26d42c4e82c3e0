//! Public API types re-used by external crates (e.g., the HTTP API layer).

use ai_llm_service::{LlmProvider, ProviderPreference};
use rag_store::RetrievedChunk;
use serde::{Deserialize, Serialize};

use crate::prompt::excerpt;

fn default_true() -> bool {
    true
}

fn default_max_context_length() -> usize {
    4000
}

/// One chat question with its retrieval and presentation flags.
///
/// # Example
/// ```
/// use contextor::ChatRequest;
/// let req: ChatRequest = serde_json::from_str(r#"{"message": "What is a geoid?"}"#).unwrap();
/// assert!(req.include_thinking && req.include_sources && !req.use_web_search);
/// assert_eq!(req.max_context_length, 4000);
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Restricts knowledge-base retrieval to these source files.
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default = "default_true")]
    pub include_thinking: bool,
    #[serde(default = "default_true")]
    pub include_sources: bool,
    #[serde(default)]
    pub use_web_search: bool,
    /// Character budget of the context window.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
    /// Overrides the configured `TOP_K`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Overrides the configured provider preference.
    #[serde(default)]
    pub provider: Option<ProviderPreference>,
}

impl ChatRequest {
    /// Request with default flags, as the JSON defaults would produce.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context_files: Vec::new(),
            include_thinking: true,
            include_sources: true,
            use_web_search: false,
            max_context_length: default_max_context_length(),
            top_k: None,
            provider: None,
        }
    }
}

/// Where a cited source came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    KnowledgeBase,
    WebSearch,
    Wikipedia,
}

/// A citation returned next to the answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub relevance_score: f32,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl SourceRef {
    pub fn knowledge_base(chunk: &RetrievedChunk) -> Self {
        Self {
            kind: SourceKind::KnowledgeBase,
            filename: Some(if chunk.filename.is_empty() {
                "Unknown".to_string()
            } else {
                chunk.filename.clone()
            }),
            title: chunk.title.clone(),
            url: None,
            relevance_score: chunk.score,
            excerpt: excerpt(&chunk.text),
            content: None,
            page_number: chunk.page,
            section: chunk.section.clone(),
            timestamp: None,
        }
    }
}

/// Token counters; `total == input + output`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl TokenCounts {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    /// Characters in the rendered context window.
    pub context_length: usize,
    pub sources_used: usize,
    pub web_search_used: bool,
}

/// Final answer together with citations and accounting.
#[derive(Clone, Debug, Serialize)]
pub struct ChatAnswer {
    pub response: String,
    pub thinking: Option<String>,
    pub sources: Vec<SourceRef>,
    /// Seconds spent serving the request.
    pub processing_time: f64,
    pub tokens: TokenCounts,
    pub provider: LlmProvider,
    pub model: String,
    pub metadata: ChatMetadata,
}
