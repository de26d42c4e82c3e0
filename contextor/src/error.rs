//! Typed error for the contextor crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextorError {
    /// The request failed validation before any upstream call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid environment configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Errors from the retrieval collaborators (embedding, vector store, reranker).
    #[error("retrieval error: {0}")]
    Rag(#[from] rag_store::RagError),

    /// Errors from the LLM provider chain.
    #[error("{0}")]
    Llm(#[from] ai_llm_service::AiLlmError),

    /// HTTP/transport errors when calling a web search endpoint.
    #[error("http error calling {service}: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A web search endpoint answered with an unexpected payload.
    #[error("unexpected {service} response: {reason}")]
    WebDecode {
        service: &'static str,
        reason: String,
    },
}

impl ContextorError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> ContextorError {
        move |source| ContextorError::Http { service, source }
    }
}
