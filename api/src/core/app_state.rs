use std::sync::Arc;

use ai_llm_service::ProviderSelector;
use chrono::{DateTime, Utc};
use contextor::{CompositeWebSearch, PipelineConfig, RagPipeline, WebSearch};
use deep_discovery::{DiscoveryEngine, DiscoverySettings, InMemorySessionStore};
use rag_store::RagStore;
use services::CodeSandbox;
use tracing::info;

use crate::error_handler::{AppError, AppResult};

/// Timeout for the public web search endpoints.
const WEB_SEARCH_TIMEOUT_SECS: u64 = 10;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Retrieval clients, kept for health checks and `/config`.
    pub rag: RagStore,
    /// Chat orchestration (retrieval + web + LLM).
    pub pipeline: Arc<RagPipeline>,
    pub discovery: Arc<DiscoveryEngine>,
    pub sandbox: Arc<CodeSandbox>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        rag: RagStore,
        pipeline: Arc<RagPipeline>,
        discovery: Arc<DiscoveryEngine>,
        sandbox: Arc<CodeSandbox>,
    ) -> Self {
        Self {
            rag,
            pipeline,
            discovery,
            sandbox,
            started_at: Utc::now(),
        }
    }

    /// Builds every component from the environment.
    ///
    /// # Errors
    /// [`AppError::Config`] when any component rejects its configuration,
    /// including when no LLM provider is configured.
    pub fn from_env() -> AppResult<Self> {
        let rag = RagStore::from_env().map_err(|e| AppError::Config(e.to_string()))?;
        let llm = Arc::new(ProviderSelector::from_env().map_err(|e| AppError::Config(e.to_string()))?);
        let cfg = PipelineConfig::from_env().map_err(|e| AppError::Config(e.to_string()))?;

        let web: Option<Arc<dyn WebSearch>> = if cfg.web_search_enabled {
            let engines = CompositeWebSearch::public(WEB_SEARCH_TIMEOUT_SECS)
                .map_err(|e| AppError::Config(e.to_string()))?;
            Some(Arc::new(engines))
        } else {
            None
        };

        let pipeline = Arc::new(RagPipeline::from_store(&rag, llm, web, cfg));
        let settings =
            DiscoverySettings::from_env().map_err(|e| AppError::Config(e.to_string()))?;
        let discovery = Arc::new(DiscoveryEngine::new(
            Arc::new(InMemorySessionStore::default()),
            Arc::clone(&pipeline),
            settings,
        ));
        let sandbox = Arc::new(CodeSandbox::from_env());

        info!(
            backend = rag.cfg.backend_name(),
            collection = rag.cfg.collection(),
            web_search = pipeline.config().web_search_enabled,
            "application state initialized"
        );

        Ok(Self::new(rag, pipeline, discovery, sandbox))
    }

    pub fn llm(&self) -> &Arc<ProviderSelector> {
        self.pipeline.selector()
    }
}
