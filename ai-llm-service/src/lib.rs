//! Shared LLM layer: provider configs, HTTP clients (OpenAI, Sagemaker),
//! health checks and the provider selector that routes generation requests
//! through a priority chain with fallback.

pub mod backend;
pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod provider_selector;
pub mod services;
pub mod telemetry;

pub use backend::{ChatMessage, ChatRole, Generation, LlmBackend, TokenUsage};
pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::{LlmProvider, ProviderPreference};
pub use error_handler::AiLlmError;
pub use health_service::HealthStatus;
pub use provider_selector::ProviderSelector;
