use std::{sync::Arc, time::Duration};

use ai_llm_service::{
    AiLlmError, ChatMessage, Generation, HealthStatus, LlmBackend, LlmProvider,
    ProviderPreference, ProviderSelector,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use contextor::{PipelineConfig, RagPipeline};
use deep_discovery::{DiscoveryEngine, DiscoverySettings, InMemorySessionStore};
use rag_store::{
    ChunkFilter, ChunkRecord, Embedder, QdrantConfig, RagConfig, RagError, RagStore, Reranker, RetrievedChunk,
    VectorBackend, VectorStore,
};
use serde_json::{Value, json};
use services::CodeSandbox;
use tower::ServiceExt;

use super::router;
use crate::core::app_state::AppState;

struct FakeEmbedder {
    healthy: bool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, RagError> {
        Ok(vec![0.1, 0.2, 0.3])
    }

    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
    }

    async fn health(&self) -> bool {
        self.healthy
    }
}

/// Vector order: a.pdf first.
struct FakeStore;

#[async_trait]
impl VectorStore for FakeStore {
    async fn search(
        &self,
        _vector: Vec<f32>,
        _top_n: u64,
        _filter: Option<&ChunkFilter>,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let chunk = |text: &str, filename: &str, score: f32| RetrievedChunk {
            text: text.into(),
            filename: filename.into(),
            title: None,
            section: None,
            subsection: None,
            page: Some(1),
            index: None,
            score,
        };
        Ok(vec![
            chunk("Sea level basics.", "a.pdf", 0.95),
            chunk("The geoid is an equipotential surface.", "b.pdf", 0.60),
        ])
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
        true
    }
}

/// Flips the vector order.
struct FakeReranker;

#[async_trait]
impl Reranker for FakeReranker {
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>, RagError> {
        Ok(passages
            .iter()
            .map(|p| if p.contains("geoid") { 0.9 } else { 0.4 })
            .collect())
    }

    async fn health(&self) -> bool {
        true
    }
}

struct FakeLlm {
    provider: LlmProvider,
    healthy: bool,
}

#[async_trait]
impl LlmBackend for FakeLlm {
    fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, _messages: &[ChatMessage]) -> Result<Generation, AiLlmError> {
        Ok(Generation {
            text: "<thinking>compare sources</thinking>The geoid is an equipotential surface."
                .into(),
            provider: self.provider,
            model: "fake-model".into(),
            usage: None,
        })
    }

    async fn health(&self) -> HealthStatus {
        if self.healthy {
            HealthStatus::ok(self.provider, "http://fake", Some("fake-model"), 1, "up")
        } else {
            HealthStatus::fail(self.provider, "http://fake", Some("fake-model"), 1, "down")
        }
    }
}

fn rag_config() -> RagConfig {
    RagConfig {
        embedding_url: "http://localhost:8810".into(),
        reranking_url: "http://localhost:8811".into(),
        embedding_batch_size: 32,
        reranking_batch_size: 32,
        rerank_with_meta: false,
        embedding_dim: None,
        http_timeout_secs: 5,
        chunk_max_tokens: 512,
        backend: VectorBackend::Qdrant(QdrantConfig {
            url: "http://127.0.0.1:6334".into(),
            api_key: Some("qdrant-secret-key".into()),
            collection: "geodocs".into(),
            exact_search: false,
        }),
    }
}

fn state_with(embedder_up: bool, llms: Vec<(LlmProvider, bool)>) -> Arc<AppState> {
    let rag = RagStore {
        cfg: rag_config(),
        embedder: Arc::new(FakeEmbedder {
            healthy: embedder_up,
        }),
        reranker: Arc::new(FakeReranker),
        store: Arc::new(FakeStore),
    };
    let backends: Vec<Arc<dyn LlmBackend>> = llms
        .into_iter()
        .map(|(provider, healthy)| Arc::new(FakeLlm { provider, healthy }) as Arc<dyn LlmBackend>)
        .collect();
    let llm = Arc::new(ProviderSelector::new(
        backends,
        ProviderPreference::Auto,
        Duration::from_secs(60),
    ));
    let cfg = PipelineConfig {
        rerank_with_meta: false,
        web_search_enabled: false,
        ..PipelineConfig::default()
    };
    let pipeline = Arc::new(RagPipeline::from_store(&rag, llm, None, cfg));
    let discovery = Arc::new(DiscoveryEngine::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::clone(&pipeline),
        DiscoverySettings {
            pause_poll: Duration::from_millis(10),
            step_delay: Duration::ZERO,
            estimated_secs_per_step: 30,
        },
    ));
    Arc::new(AppState::new(
        rag,
        pipeline,
        discovery,
        Arc::new(CodeSandbox::new("sh")),
    ))
}

fn state() -> Arc<AppState> {
    state_with(true, vec![(LlmProvider::OpenAI, true)])
}

async fn send(state: Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
    let res = router(state).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn chat_returns_reranked_sources_and_token_totals() {
    let (status, body) = send(state(), post_json("/chat", json!({"message": "What is a geoid?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "The geoid is an equipotential surface.");
    assert_eq!(body["thinking"], "compare sources");
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["sources"][0]["filename"], "b.pdf");
    assert_eq!(body["sources"][0]["type"], "knowledge_base");

    let t = &body["tokens"];
    assert_eq!(
        t["total"].as_u64().unwrap(),
        t["input"].as_u64().unwrap() + t["output"].as_u64().unwrap()
    );
}

#[tokio::test]
async fn auto_mode_answers_with_the_healthy_secondary() {
    let state = state_with(
        true,
        vec![(LlmProvider::OpenAI, false), (LlmProvider::Sagemaker, true)],
    );
    let (status, body) = send(state, post_json("/chat", json!({"message": "geoid?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "sagemaker");
}

#[tokio::test]
async fn empty_message_is_a_bad_request_envelope() {
    let (status, body) = send(state(), post_json("/chat", json!({"message": "  "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["details"].is_array());
}

#[tokio::test]
async fn oversized_top_k_is_a_bad_request() {
    let (status, body) = send(
        state(),
        post_json("/chat", json!({"message": "geoid?", "top_k": 1_000_000})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("top_k"));
}

#[tokio::test]
async fn markdown_document_is_ingested() {
    let doc = "# Geodesy\n## Heights\nThe geoid approximates mean sea level.\n\
               ## Datums\nA datum anchors coordinates.\n";
    let (status, body) = send(
        state(),
        post_json("/kb/documents", json!({"filename": "geodesy.md", "content": doc})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["filename"], "geodesy.md");
    assert_eq!(body["chunks"], 2);
    assert_eq!(body["sections"], 2);
}

#[tokio::test]
async fn ingest_requires_filename_and_content() {
    let (status, body) = send(
        state(),
        post_json("/kb/documents", json!({"filename": " ", "content": "# T\ntext"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["path"], "filename");

    let (status, body) = send(
        state(),
        post_json("/kb/documents", json!({"filename": "a.md", "content": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["path"], "content");
}

#[tokio::test]
async fn malformed_and_incomplete_json_are_400() {
    let req = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(state(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(state(), post_json("/chat", json!({"include_thinking": true}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_discovery_is_404() {
    let (status, body) = send(state(), get("/discovery/discovery_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(
        state(),
        post_json("/discovery/discovery_missing/pause", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discovery_start_then_poll() {
    let state = state();
    let (status, body) = send(
        Arc::clone(&state),
        post_json("/discovery/start", json!({"query": "coastal subsidence"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "starting");
    assert_eq!(body["estimated_time"], 150);
    let id = body["discovery_id"].as_str().unwrap().to_string();
    assert!(id.starts_with("discovery_"));

    let (status, snap) = send(state, get(&format!("/discovery/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snap["id"], id.as_str());
    assert_eq!(snap["steps"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn health_reports_degraded_when_a_service_is_down() {
    let (status, body) = send(
        state_with(false, vec![(LlmProvider::OpenAI, true)]),
        get("/health"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["embedding"], "offline");
    assert_eq!(body["services"]["reranking"], "online");
    assert_eq!(body["services"]["llm"], "online");

    let (_, body) = send(state(), get("/health")).await;
    assert_eq!(body["status"], "online");
}

#[tokio::test]
async fn provider_switch_validates_and_reorders() {
    let state = state_with(
        true,
        vec![(LlmProvider::OpenAI, true), (LlmProvider::Sagemaker, true)],
    );

    let (status, body) = send(
        Arc::clone(&state),
        post_json("/llm/provider", json!({"provider": "ollama"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["path"], "provider");

    let (status, body) = send(
        Arc::clone(&state),
        post_json("/llm/provider", json!({"provider": "sagemaker"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_provider"], "sagemaker");

    let (_, body) = send(state, get("/llm/providers")).await;
    assert_eq!(body["current_provider"], "sagemaker");
    assert_eq!(body["available_providers"], json!(["sagemaker", "openai"]));
}

#[tokio::test]
async fn unconfigured_provider_is_rejected() {
    let (status, _) = send(
        state(),
        post_json("/llm/provider", json!({"provider": "sagemaker"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn config_hides_credentials() {
    let res = router(state()).oneshot(get("/config")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!text.contains("qdrant-secret-key"));

    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["vector_store"]["backend"], "qdrant");
    assert_eq!(body["vector_store"]["collection"], "geodocs");
    assert_eq!(body["vector_store"]["credentials_configured"], true);
    assert_eq!(body["retrieval"]["top_k"], 5);
}

#[tokio::test]
async fn code_execution_validation_and_lookup() {
    let (status, body) = send(
        state(),
        post_json("/code/execute", json!({"code": "print(1)", "timeout": 500})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["path"], "timeout");

    let (status, _) = send(state(), get("/code/execution/exec_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_gets_envelope_and_request_id() {
    let res = router(state())
        .oneshot(
            Request::builder()
                .uri("/nope")
                .header("X-Request-Id", "req-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["X-Request-Id"], "req-test");
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
