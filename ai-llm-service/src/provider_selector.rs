//! Provider selection with health-gated auto mode and ordered fallback.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Holds the configured backends as an ordered chain (highest priority first).
//! - `auto` walks the chain and returns the first backend whose health check
//!   passes; health results are cached for a TTL.
//! - An explicit preference returns that backend without a health gate.
//! - [`ProviderSelector::generate`] falls through the rest of the chain when
//!   the selected backend fails.
//!
//! # Example
//! ```no_run
//! use ai_llm_service::{ChatMessage, ProviderPreference, ProviderSelector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ai_llm_service::AiLlmError> {
//!     let selector = ProviderSelector::from_env()?;
//!     let out = selector
//!         .generate(Some(ProviderPreference::Auto), &[ChatMessage::user("What is a geoid?")])
//!         .await?;
//!     println!("{} answered: {}", out.provider, out.text);
//!     Ok(())
//! }
//! ```

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    backend::{ChatMessage, Generation, LlmBackend},
    config::{
        default_config,
        llm_provider::{LlmProvider, ProviderPreference},
    },
    error_handler::{AiLlmError, Result},
    health_service::HealthStatus,
    services::{open_ai_service::OpenAiService, sagemaker_service::SagemakerService},
};

struct CachedHealth {
    status: HealthStatus,
    at: Instant,
}

pub struct ProviderSelector {
    chain: RwLock<Vec<Arc<dyn LlmBackend>>>,
    default_preference: ProviderPreference,
    health_ttl: Duration,
    health_cache: RwLock<HashMap<LlmProvider, CachedHealth>>,
}

impl ProviderSelector {
    /// Builds a selector over `backends`, kept in the given order.
    pub fn new(
        backends: Vec<Arc<dyn LlmBackend>>,
        default_preference: ProviderPreference,
        health_ttl: Duration,
    ) -> Self {
        Self {
            chain: RwLock::new(backends),
            default_preference,
            health_ttl,
            health_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Builds every provider configured in the environment, ordered by
    /// `LLM_PRIORITY`. Providers missing from the priority list go last.
    ///
    /// # Errors
    /// Config errors, or [`crate::error_handler::ConfigError::NoProviders`].
    pub fn from_env() -> Result<Self> {
        let priority = default_config::provider_priority()?;
        let preference = default_config::provider_preference()?;
        let ttl = default_config::health_ttl()?;

        let mut backends: Vec<Arc<dyn LlmBackend>> = Vec::new();
        for cfg in default_config::configured_providers()? {
            let backend: Arc<dyn LlmBackend> = match cfg.provider {
                LlmProvider::OpenAI => Arc::new(OpenAiService::new(cfg)?),
                LlmProvider::Sagemaker => Arc::new(SagemakerService::new(cfg)?),
            };
            backends.push(backend);
        }
        backends.sort_by_key(|b| {
            priority
                .iter()
                .position(|p| *p == b.provider())
                .unwrap_or(usize::MAX)
        });

        info!(
            chain = ?backends.iter().map(|b| b.provider()).collect::<Vec<_>>(),
            preference = ?preference,
            health_ttl_secs = ttl.as_secs(),
            "ProviderSelector initialized"
        );

        Ok(Self::new(backends, preference, ttl))
    }

    pub fn default_preference(&self) -> ProviderPreference {
        self.default_preference
    }

    /// Configured providers in current priority order.
    pub async fn providers(&self) -> Vec<LlmProvider> {
        self.chain.read().await.iter().map(|b| b.provider()).collect()
    }

    /// The head of the chain.
    pub async fn primary(&self) -> Option<LlmProvider> {
        self.chain.read().await.first().map(|b| b.provider())
    }

    /// Moves `provider` to the front of the chain.
    ///
    /// # Errors
    /// [`AiLlmError::ProviderNotConfigured`] if it is not in the chain.
    pub async fn set_primary(&self, provider: LlmProvider) -> Result<()> {
        let mut chain = self.chain.write().await;
        let idx = chain
            .iter()
            .position(|b| b.provider() == provider)
            .ok_or(AiLlmError::ProviderNotConfigured(provider))?;
        let backend = chain.remove(idx);
        chain.insert(0, backend);
        info!(%provider, "primary LLM provider changed");
        Ok(())
    }

    /// Health of one backend, served from cache while fresh.
    pub async fn health_of(&self, backend: &Arc<dyn LlmBackend>) -> HealthStatus {
        let provider = backend.provider();
        if let Some(hit) = self.health_cache.read().await.get(&provider) {
            if hit.at.elapsed() < self.health_ttl {
                return hit.status.clone();
            }
        }

        let status = backend.health().await;
        self.health_cache.write().await.insert(
            provider,
            CachedHealth {
                status: status.clone(),
                at: Instant::now(),
            },
        );
        status
    }

    /// Health for every configured provider, in chain order.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let chain = self.chain.read().await.clone();
        let mut out = Vec::with_capacity(chain.len());
        for backend in &chain {
            out.push(self.health_of(backend).await);
        }
        out
    }

    /// Resolves a preference to a concrete backend.
    ///
    /// # Errors
    /// - [`AiLlmError::ProviderNotConfigured`] for an explicit, unconfigured provider
    /// - [`AiLlmError::NoProviderAvailable`] when `auto` finds no healthy provider
    pub async fn select(&self, pref: ProviderPreference) -> Result<Arc<dyn LlmBackend>> {
        let chain = self.chain.read().await.clone();

        if let Some(wanted) = pref.explicit() {
            return chain
                .into_iter()
                .find(|b| b.provider() == wanted)
                .ok_or(AiLlmError::ProviderNotConfigured(wanted));
        }

        let mut reasons = Vec::new();
        for backend in chain {
            let status = self.health_of(&backend).await;
            if status.ok {
                return Ok(backend);
            }
            warn!(
                provider = %backend.provider(),
                message = %status.message,
                "provider unhealthy; trying next"
            );
            reasons.push(format!("{}: {}", backend.provider(), status.message));
        }

        Err(AiLlmError::NoProviderAvailable(if reasons.is_empty() {
            "no providers configured".to_string()
        } else {
            reasons.join("; ")
        }))
    }

    /// Generates with the selected provider, falling back through the rest of
    /// the chain in priority order. `None` uses the configured default preference.
    ///
    /// # Errors
    /// Selection errors, or the last provider error when every attempt failed.
    pub async fn generate(
        &self,
        pref: Option<ProviderPreference>,
        messages: &[ChatMessage],
    ) -> Result<Generation> {
        let pref = pref.unwrap_or(self.default_preference);
        let first = self.select(pref).await?;

        let mut attempts: Vec<Arc<dyn LlmBackend>> = vec![first.clone()];
        attempts.extend(
            self.chain
                .read()
                .await
                .iter()
                .filter(|b| b.provider() != first.provider())
                .cloned(),
        );

        let mut last_err = None;
        for backend in attempts {
            match backend.generate(messages).await {
                Ok(out) => {
                    if out.provider != first.provider() {
                        info!(
                            requested = %first.provider(),
                            served_by = %out.provider,
                            "generation served by fallback provider"
                        );
                    }
                    return Ok(out);
                }
                Err(err) => {
                    warn!(provider = %backend.provider(), error = %err, "generation failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| AiLlmError::NoProviderAvailable("empty provider chain".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TokenUsage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockBackend {
        pub provider: LlmProvider,
        pub healthy: bool,
        pub fails: bool,
        pub health_calls: AtomicUsize,
        pub generate_calls: AtomicUsize,
    }

    impl MockBackend {
        pub fn new(provider: LlmProvider, healthy: bool, fails: bool) -> Arc<Self> {
            Arc::new(Self {
                provider,
                healthy,
                fails,
                health_calls: AtomicUsize::new(0),
                generate_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        fn provider(&self) -> LlmProvider {
            self.provider
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn generate(&self, _messages: &[ChatMessage]) -> Result<Generation> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(AiLlmError::Timeout(Duration::from_secs(1)));
            }
            Ok(Generation {
                text: format!("answer from {}", self.provider),
                provider: self.provider,
                model: "mock-model".into(),
                usage: Some(TokenUsage {
                    input: 10,
                    output: 5,
                }),
            })
        }

        async fn health(&self) -> HealthStatus {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                HealthStatus::ok(self.provider, "http://mock", Some("mock-model"), 1, "ok")
            } else {
                HealthStatus::fail(self.provider, "http://mock", Some("mock-model"), 1, "down")
            }
        }
    }

    fn selector(backends: Vec<Arc<MockBackend>>) -> ProviderSelector {
        let chain: Vec<Arc<dyn LlmBackend>> = backends
            .into_iter()
            .map(|b| b as Arc<dyn LlmBackend>)
            .collect();
        ProviderSelector::new(chain, ProviderPreference::Auto, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn auto_skips_unhealthy_primary_and_names_secondary() {
        let openai = MockBackend::new(LlmProvider::OpenAI, false, false);
        let sagemaker = MockBackend::new(LlmProvider::Sagemaker, true, false);
        let sel = selector(vec![openai.clone(), sagemaker.clone()]);

        let out = sel
            .generate(None, &[ChatMessage::user("q")])
            .await
            .unwrap();

        assert_eq!(out.provider, LlmProvider::Sagemaker);
        assert_eq!(openai.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_preference_is_not_health_gated() {
        let openai = MockBackend::new(LlmProvider::OpenAI, false, false);
        let sagemaker = MockBackend::new(LlmProvider::Sagemaker, true, false);
        let sel = selector(vec![openai.clone(), sagemaker]);

        let b = sel.select(ProviderPreference::OpenAI).await.unwrap();
        assert_eq!(b.provider(), LlmProvider::OpenAI);
        assert_eq!(openai.health_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_unconfigured_provider_is_an_error() {
        let sel = selector(vec![MockBackend::new(LlmProvider::OpenAI, true, false)]);
        let err = sel.select(ProviderPreference::Sagemaker).await.err().unwrap();
        assert!(matches!(
            err,
            AiLlmError::ProviderNotConfigured(LlmProvider::Sagemaker)
        ));
    }

    #[tokio::test]
    async fn failed_generation_falls_back_in_priority_order() {
        let openai = MockBackend::new(LlmProvider::OpenAI, true, true);
        let sagemaker = MockBackend::new(LlmProvider::Sagemaker, true, false);
        let sel = selector(vec![openai.clone(), sagemaker]);

        let out = sel
            .generate(Some(ProviderPreference::OpenAI), &[ChatMessage::user("q")])
            .await
            .unwrap();
        assert_eq!(out.provider, LlmProvider::Sagemaker);
        assert_eq!(openai.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_with_no_healthy_provider_is_unavailable() {
        let sel = selector(vec![
            MockBackend::new(LlmProvider::OpenAI, false, false),
            MockBackend::new(LlmProvider::Sagemaker, false, false),
        ]);
        let err = sel.generate(None, &[ChatMessage::user("q")]).await.err().unwrap();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn health_is_cached_within_ttl() {
        let openai = MockBackend::new(LlmProvider::OpenAI, true, false);
        let sel = selector(vec![openai.clone()]);
        sel.select(ProviderPreference::Auto).await.unwrap();
        sel.select(ProviderPreference::Auto).await.unwrap();
        assert_eq!(openai.health_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn set_primary_reorders_chain() {
        let sel = selector(vec![
            MockBackend::new(LlmProvider::OpenAI, true, false),
            MockBackend::new(LlmProvider::Sagemaker, true, false),
        ]);
        sel.set_primary(LlmProvider::Sagemaker).await.unwrap();
        assert_eq!(
            sel.providers().await,
            vec![LlmProvider::Sagemaker, LlmProvider::OpenAI]
        );
        assert_eq!(sel.primary().await, Some(LlmProvider::Sagemaker));
    }
}
