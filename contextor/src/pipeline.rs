//! The retrieval-augmented chat pipeline.
//!
//! embed → vector search (recall N) → rerank → top-K → neighbour expansion →
//! context window → prompt → LLM via the provider selector → thinking split →
//! citations.

use std::{sync::Arc, time::Instant};

use ai_llm_service::{ChatMessage, Generation, ProviderPreference, ProviderSelector};
use futures::future::join_all;
use rag_store::{
    ChunkFilter, Embedder, RagError, RagStore, Reranker, RetrievedChunk, VectorStore,
    expand_chunk,
};
use tracing::{debug, info, warn};

use crate::{
    api_types::{ChatAnswer, ChatMetadata, ChatRequest, SourceRef, TokenCounts},
    cfg::PipelineConfig,
    error::ContextorError,
    prompt::{build_context, build_rag_prompt, estimate_tokens, parse_thinking},
    web_search::WebSearch,
};

/// Owns the retrieval collaborators and the LLM selector.
///
/// Construct once, wrap in `Arc`, and share between request handlers and
/// background discovery runners.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    llm: Arc<ProviderSelector>,
    web: Option<Arc<dyn WebSearch>>,
    cfg: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        llm: Arc<ProviderSelector>,
        web: Option<Arc<dyn WebSearch>>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            llm,
            web,
            cfg,
        }
    }

    /// Wires the clients of a [`RagStore`] facade.
    pub fn from_store(
        rag: &RagStore,
        llm: Arc<ProviderSelector>,
        web: Option<Arc<dyn WebSearch>>,
        cfg: PipelineConfig,
    ) -> Self {
        Self::new(
            rag.embedder.clone(),
            rag.store.clone(),
            rag.reranker.clone(),
            llm,
            web,
            cfg,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn selector(&self) -> &Arc<ProviderSelector> {
        &self.llm
    }

    /// Top `top_k` chunks for `query`, ordered by reranker score descending.
    ///
    /// Every returned chunk carries its reranker score in `score`. With
    /// `expand_len > 0` each chunk's text is grown with its section
    /// neighbours (see [`expand_chunk`]).
    ///
    /// # Errors
    /// Embedding, vector search or reranking failures ([`ContextorError::Rag`]).
    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&ChunkFilter>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ContextorError> {
        let started = Instant::now();

        let vector = self.embedder.embed_query(query).await?;
        if let Some(want) = self.cfg.embedding_dim {
            if vector.len() != want {
                return Err(RagError::VectorSizeMismatch {
                    got: vector.len(),
                    want,
                }
                .into());
            }
        }

        let recall = self.cfg.recall_num.max(top_k as u64);
        let mut chunks = self.store.search(vector, recall, filter).await?;
        debug!(recalled = chunks.len(), recall, "vector search done");
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let passages: Vec<String> = chunks
            .iter()
            .map(|c| {
                let meta = c.meta_line();
                if self.cfg.rerank_with_meta && !meta.is_empty() {
                    format!("{meta}\n{}", c.text)
                } else {
                    c.text.clone()
                }
            })
            .collect();
        let scores = self.reranker.score(query, &passages).await?;
        if scores.len() != chunks.len() {
            return Err(RagError::ScoreCountMismatch {
                got: scores.len(),
                want: chunks.len(),
            }
            .into());
        }
        for (chunk, score) in chunks.iter_mut().zip(scores) {
            chunk.score = score;
        }

        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(threshold) = self.cfg.score_threshold {
            chunks.retain(|c| c.score >= threshold);
        }
        chunks.truncate(top_k);
        if self.cfg.expand_len > 0 {
            chunks = self.expand(chunks).await;
        }

        info!(
            kept = chunks.len(),
            top_k,
            latency_ms = started.elapsed().as_millis(),
            "retrieval completed"
        );
        Ok(chunks)
    }

    /// Grows each chunk with its section neighbours. A chunk whose lookup
    /// fails or times out is kept as retrieved.
    async fn expand(&self, chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        let budget = self.cfg.expand_len;
        let limit = self.cfg.expand_timeout;
        join_all(chunks.into_iter().map(|hit| async move {
            if hit.index.is_none() {
                return hit;
            }
            let section = hit.section.clone().unwrap_or_default();
            let lookup = self.store.section_chunks(&hit.filename, &section);
            match tokio::time::timeout(limit, lookup).await {
                Ok(Ok(siblings)) => expand_chunk(&hit, &siblings, budget),
                Ok(Err(e)) => {
                    warn!(filename = %hit.filename, error = %e, "neighbour lookup failed; keeping chunk");
                    hit
                }
                Err(_) => {
                    warn!(filename = %hit.filename, ?limit, "neighbour lookup timed out; keeping chunk");
                    hit
                }
            }
        }))
        .await
    }

    /// Web sources for `query`; empty when web search is disabled.
    pub async fn web_search(&self, query: &str, max_results: usize) -> Vec<SourceRef> {
        let Some(web) = self.web.as_ref().filter(|_| self.cfg.web_search_enabled) else {
            debug!("web search disabled; skipping");
            return Vec::new();
        };
        match web.search(query, max_results).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "web search failed");
                Vec::new()
            }
        }
    }

    /// Single-prompt generation through the provider chain.
    pub async fn generate(
        &self,
        pref: Option<ProviderPreference>,
        prompt: &str,
    ) -> Result<Generation, ContextorError> {
        Ok(self.llm.generate(pref, &[ChatMessage::user(prompt)]).await?)
    }

    /// Answers one chat request.
    ///
    /// Knowledge-base retrieval runs when `context_files` is given or web
    /// search is off. With web search on, a retrieval failure is logged and
    /// the answer proceeds on web context alone.
    ///
    /// # Errors
    /// - [`ContextorError::InvalidRequest`] for an empty message, zero budgets
    ///   or a `top_k` above the vector recall size
    /// - [`ContextorError::Rag`] when retrieval fails without web search
    /// - [`ContextorError::Llm`] when no provider could answer
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatAnswer, ContextorError> {
        let started = Instant::now();
        validate(req, self.cfg.recall_num)?;
        let top_k = req.top_k.unwrap_or(self.cfg.top_k);

        let mut sources: Vec<SourceRef> = Vec::new();
        let mut chunks: Vec<String> = Vec::new();

        if !req.context_files.is_empty() || !req.use_web_search {
            let filter = ChunkFilter::by_filenames(req.context_files.iter().cloned());
            match self.retrieve(&req.message, filter.as_ref(), top_k).await {
                Ok(found) => {
                    info!(docs = found.len(), "retrieved documents from knowledge base");
                    for chunk in &found {
                        if req.include_sources {
                            sources.push(SourceRef::knowledge_base(chunk));
                        }
                        chunks.push(chunk.text.clone());
                    }
                }
                Err(e) if req.use_web_search => {
                    warn!(error = %e, "knowledge base retrieval failed; continuing with web search");
                }
                Err(e) => return Err(e),
            }
        }

        if req.use_web_search {
            let found = self
                .web_search(&req.message, self.cfg.web_max_results)
                .await;
            for src in found {
                if let Some(content) = src.content.as_ref().filter(|c| !c.is_empty()) {
                    chunks.push(content.clone());
                }
                if req.include_sources {
                    sources.push(src);
                }
            }
        }

        let context = build_context(&chunks, req.max_context_length);
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let prompt = build_rag_prompt(&req.message, &context, req.include_thinking, &today);

        debug!(
            prompt_chars = prompt.len(),
            context_chars = context.len(),
            "generating answer"
        );
        let generation = self.generate(req.provider, &prompt).await?;
        let (thinking, response) = parse_thinking(&generation.text, req.include_thinking);

        let tokens = match generation.usage {
            Some(u) => TokenCounts::new(u.input, u.output),
            None => TokenCounts::new(estimate_tokens(&prompt), estimate_tokens(&response)),
        };

        let processing_time = started.elapsed().as_secs_f64();
        info!(
            provider = %generation.provider,
            model = %generation.model,
            sources = sources.len(),
            tokens_total = tokens.total,
            processing_ms = started.elapsed().as_millis(),
            "chat answered"
        );

        Ok(ChatAnswer {
            response,
            thinking,
            metadata: ChatMetadata {
                context_length: context.chars().count(),
                sources_used: sources.len(),
                web_search_used: req.use_web_search,
            },
            sources,
            processing_time,
            tokens,
            provider: generation.provider,
            model: generation.model,
        })
    }
}

fn validate(req: &ChatRequest, recall_num: u64) -> Result<(), ContextorError> {
    if req.message.trim().is_empty() {
        return Err(ContextorError::InvalidRequest("message must not be empty".into()));
    }
    if req.max_context_length == 0 {
        return Err(ContextorError::InvalidRequest(
            "max_context_length must be > 0".into(),
        ));
    }
    match req.top_k {
        Some(0) => Err(ContextorError::InvalidRequest("top_k must be > 0".into())),
        Some(k) if k as u64 > recall_num => Err(ContextorError::InvalidRequest(format!(
            "top_k must be <= {recall_num}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Mutex, time::Duration};

    use ai_llm_service::{AiLlmError, HealthStatus, LlmBackend, LlmProvider, TokenUsage};
    use async_trait::async_trait;

    use rag_store::ChunkRecord;

    use crate::api_types::SourceKind;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
        async fn health(&self) -> bool {
            true
        }
    }

    struct FixedStore {
        chunks: Vec<RetrievedChunk>,
        /// Answers `section_chunks`.
        section: Vec<RetrievedChunk>,
        seen_filter: Mutex<Option<ChunkFilter>>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn search(
            &self,
            _vector: Vec<f32>,
            top_n: u64,
            filter: Option<&ChunkFilter>,
        ) -> Result<Vec<RetrievedChunk>, RagError> {
            *self.seen_filter.lock().unwrap() = filter.cloned();
            Ok(self.chunks.iter().take(top_n as usize).cloned().collect())
        }
        async fn insert(
            &self,
            records: &[ChunkRecord],
            _vectors: &[Vec<f32>],
        ) -> Result<u64, RagError> {
            Ok(records.len() as u64)
        }
        async fn section_chunks(
            &self,
            filename: &str,
            section: &str,
        ) -> Result<Vec<RetrievedChunk>, RagError> {
            Ok(self
                .section
                .iter()
                .filter(|c| c.filename == filename)
                .filter(|c| c.section.as_deref().unwrap_or_default() == section)
                .cloned()
                .collect())
        }
        async fn health(&self) -> bool {
            true
        }
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn search(
            &self,
            _vector: Vec<f32>,
            _top_n: u64,
            _filter: Option<&ChunkFilter>,
        ) -> Result<Vec<RetrievedChunk>, RagError> {
            Err(RagError::UpstreamStatus {
                service: "zilliz",
                status: 503,
                body: "down".into(),
            })
        }
        async fn insert(
            &self,
            records: &[ChunkRecord],
            _vectors: &[Vec<f32>],
        ) -> Result<u64, RagError> {
            Ok(records.len() as u64)
        }
        async fn section_chunks(
            &self,
            _filename: &str,
            _section: &str,
        ) -> Result<Vec<RetrievedChunk>, RagError> {
            Ok(Vec::new())
        }
        async fn health(&self) -> bool {
            false
        }
    }

    /// Returns scripted scores; records the passages it saw.
    struct ScriptedReranker {
        scores: Vec<f32>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Reranker for ScriptedReranker {
        async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>, RagError> {
            *self.seen.lock().unwrap() = passages.to_vec();
            Ok(self.scores.iter().take(passages.len()).copied().collect())
        }
        async fn health(&self) -> bool {
            true
        }
    }

    struct EchoLlm {
        reply: String,
        usage: Option<TokenUsage>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmBackend for EchoLlm {
        fn provider(&self) -> LlmProvider {
            LlmProvider::OpenAI
        }
        fn model(&self) -> &str {
            "gpt-test"
        }
        async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation, AiLlmError> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages.last().map(|m| m.content.clone()).unwrap_or_default());
            Ok(Generation {
                text: self.reply.clone(),
                provider: LlmProvider::OpenAI,
                model: "gpt-test".into(),
                usage: self.usage,
            })
        }
        async fn health(&self) -> HealthStatus {
            HealthStatus::ok(LlmProvider::OpenAI, "http://mock", Some("gpt-test"), 1, "ok")
        }
    }

    fn chunk(text: &str, filename: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: text.into(),
            filename: filename.into(),
            title: Some("Geodesy".into()),
            section: None,
            subsection: None,
            page: Some(3),
            index: None,
            score,
        }
    }

    fn llm(reply: &str, usage: Option<TokenUsage>) -> (Arc<EchoLlm>, Arc<ProviderSelector>) {
        let backend = Arc::new(EchoLlm {
            reply: reply.into(),
            usage,
            prompts: Mutex::new(Vec::new()),
        });
        let selector = ProviderSelector::new(
            vec![backend.clone() as Arc<dyn LlmBackend>],
            ProviderPreference::Auto,
            Duration::from_secs(30),
        );
        (backend, Arc::new(selector))
    }

    fn pipeline(
        store: Arc<dyn VectorStore>,
        reranker: Arc<ScriptedReranker>,
        selector: Arc<ProviderSelector>,
        cfg: PipelineConfig,
    ) -> RagPipeline {
        RagPipeline::new(Arc::new(FixedEmbedder), store, reranker, selector, None, cfg)
    }

    fn reranker(scores: Vec<f32>) -> Arc<ScriptedReranker> {
        Arc::new(ScriptedReranker {
            scores,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn reranked_order_wins_over_vector_order() {
        let store = Arc::new(FixedStore {
            chunks: vec![chunk("first", "a.pdf", 0.9), chunk("second", "b.pdf", 0.4)],
            section: Vec::new(),
            seen_filter: Mutex::new(None),
        });
        let (_, selector) = llm("answer", None);
        let p = pipeline(store, reranker(vec![0.4, 0.9]), selector, PipelineConfig::default());

        let out = p.chat(&ChatRequest::new("test")).await.unwrap();
        let names: Vec<_> = out.sources.iter().map(|s| s.filename.clone().unwrap()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
        assert_eq!(out.sources[0].relevance_score, 0.9);
        assert_eq!(out.sources[0].kind, SourceKind::KnowledgeBase);
        assert_eq!(out.sources[0].page_number, Some(3));
    }

    #[tokio::test]
    async fn sources_bounded_by_top_k_and_descending() {
        let chunks: Vec<_> = (0..8)
            .map(|i| chunk(&format!("chunk {i}"), &format!("f{i}.pdf"), 0.5))
            .collect();
        let store = Arc::new(FixedStore {
            chunks,
            section: Vec::new(),
            seen_filter: Mutex::new(None),
        });
        let scores = vec![0.1, 0.8, 0.3, 0.95, 0.2, 0.7, 0.6, 0.05];
        let (_, selector) = llm("answer", None);
        let p = pipeline(store, reranker(scores), selector, PipelineConfig::default());

        let mut req = ChatRequest::new("where is the datum?");
        req.top_k = Some(3);
        let out = p.chat(&req).await.unwrap();
        assert_eq!(out.sources.len(), 3);
        let got: Vec<f32> = out.sources.iter().map(|s| s.relevance_score).collect();
        assert_eq!(got, vec![0.95, 0.8, 0.7]);
        assert_eq!(out.metadata.sources_used, 3);
    }

    #[tokio::test]
    async fn threshold_drops_low_scores_and_meta_prefixes_passages() {
        let store = Arc::new(FixedStore {
            chunks: vec![chunk("keep", "a.pdf", 0.9), chunk("drop", "b.pdf", 0.8)],
            section: Vec::new(),
            seen_filter: Mutex::new(None),
        });
        let rr = reranker(vec![0.6, 0.2]);
        let (_, selector) = llm("answer", None);
        let cfg = PipelineConfig {
            score_threshold: Some(0.5),
            ..PipelineConfig::default()
        };
        let p = pipeline(store, rr.clone(), selector, cfg);

        let got = p.retrieve("q", None, 5).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "keep");
        assert_eq!(rr.seen.lock().unwrap()[0], "Geodesy\nkeep");
    }

    #[tokio::test]
    async fn tokens_total_is_sum_and_thinking_is_split() {
        let store = Arc::new(FixedStore {
            chunks: vec![chunk("context", "a.pdf", 0.9)],
            section: Vec::new(),
            seen_filter: Mutex::new(None),
        });
        let (backend, selector) = llm("<thinking>reasoning</thinking>\nThe geoid.", None);
        let p = pipeline(store, reranker(vec![0.7]), selector, PipelineConfig::default());

        let out = p.chat(&ChatRequest::new("What is a geoid?")).await.unwrap();
        assert_eq!(out.thinking.as_deref(), Some("reasoning"));
        assert_eq!(out.response, "The geoid.");
        assert_eq!(out.tokens.total, out.tokens.input + out.tokens.output);
        assert_eq!(out.tokens.output, estimate_tokens("The geoid."));
        assert_eq!(out.provider, LlmProvider::OpenAI);
        assert_eq!(out.model, "gpt-test");

        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("[document 1 begin]\ncontext\n[document 1 end]"));
        assert!(prompt.contains("<thinking>"));
    }

    #[tokio::test]
    async fn reported_usage_overrides_estimate() {
        let store = Arc::new(FixedStore {
            chunks: vec![],
            section: Vec::new(),
            seen_filter: Mutex::new(None),
        });
        let usage = TokenUsage {
            input: 120,
            output: 30,
        };
        let (_, selector) = llm("plain", Some(usage));
        let p = pipeline(store, reranker(vec![]), selector, PipelineConfig::default());

        let mut req = ChatRequest::new("hi");
        req.include_thinking = false;
        let out = p.chat(&req).await.unwrap();
        assert_eq!(out.tokens, TokenCounts::new(120, 30));
        assert!(out.sources.is_empty());
        assert_eq!(out.metadata.context_length, 0);
    }

    #[tokio::test]
    async fn context_files_become_a_filename_filter() {
        let store = Arc::new(FixedStore {
            chunks: vec![chunk("c", "a.pdf", 0.9)],
            section: Vec::new(),
            seen_filter: Mutex::new(None),
        });
        let (_, selector) = llm("answer", None);
        let p = pipeline(store.clone(), reranker(vec![0.5]), selector, PipelineConfig::default());

        let mut req = ChatRequest::new("q");
        req.context_files = vec!["a.pdf".into()];
        p.chat(&req).await.unwrap();
        let seen = store.seen_filter.lock().unwrap().clone().unwrap();
        assert_eq!(seen.filenames, vec!["a.pdf".to_string()]);
    }

    #[tokio::test]
    async fn retrieval_failure_is_fatal_without_web_search_only() {
        let (_, selector) = llm("answer", None);
        let p = pipeline(
            Arc::new(FailingStore),
            reranker(vec![]),
            selector,
            PipelineConfig::default(),
        );

        let err = p.chat(&ChatRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, ContextorError::Rag(_)));

        let mut req = ChatRequest::new("q");
        req.use_web_search = true;
        req.context_files = vec!["a.pdf".into()];
        let out = p.chat(&req).await.unwrap();
        assert!(out.sources.is_empty());
        assert!(out.metadata.web_search_used);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let (_, selector) = llm("answer", None);
        let p = pipeline(
            Arc::new(FailingStore),
            reranker(vec![]),
            selector,
            PipelineConfig::default(),
        );
        let err = p.chat(&ChatRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, ContextorError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn top_k_above_recall_is_rejected() {
        let (backend, selector) = llm("answer", None);
        let cfg = PipelineConfig {
            recall_num: 16,
            ..PipelineConfig::default()
        };
        let p = pipeline(Arc::new(FailingStore), reranker(vec![]), selector, cfg);

        let mut req = ChatRequest::new("q");
        req.top_k = Some(17);
        let err = p.chat(&req).await.unwrap_err();
        assert!(matches!(err, ContextorError::InvalidRequest(ref m) if m.contains("16")));
        assert!(backend.prompts.lock().unwrap().is_empty());

        req.top_k = Some(16);
        req.use_web_search = true;
        assert!(p.chat(&req).await.is_ok());
    }

    fn sectioned(index: i64, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            section: Some("Heights".into()),
            index: Some(index),
            ..chunk(text, "geodesy.md", 0.0)
        }
    }

    #[tokio::test]
    async fn retrieved_chunks_grow_with_section_neighbours() {
        let store = Arc::new(FixedStore {
            chunks: vec![sectioned(1, "The geoid is an equipotential surface.")],
            section: vec![
                sectioned(0, "Heights need a reference surface."),
                sectioned(1, "The geoid is an equipotential surface."),
                sectioned(2, "It approximates mean sea level."),
            ],
            seen_filter: Mutex::new(None),
        });
        let (_, selector) = llm("answer", None);
        let p = pipeline(store.clone(), reranker(vec![0.8]), selector.clone(), PipelineConfig::default());

        let got = p.retrieve("geoid", None, 5).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(
            got[0].text,
            "Heights need a reference surface.\n\
             The geoid is an equipotential surface.\n\
             It approximates mean sea level."
        );
        assert_eq!(got[0].score, 0.8);

        let off = PipelineConfig {
            expand_len: 0,
            ..PipelineConfig::default()
        };
        let p = pipeline(store, reranker(vec![0.8]), selector, off);
        let got = p.retrieve("geoid", None, 5).await.unwrap();
        assert_eq!(got[0].text, "The geoid is an equipotential surface.");
    }
}
