//! Provider-agnostic generation interface.
//!
//! Every concrete client (OpenAI, Sagemaker) implements [`LlmBackend`], which
//! lets the [`crate::ProviderSelector`] treat them as interchangeable links of
//! a fallback chain and lets callers inject mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{config::llm_provider::LlmProvider, error_handler::Result, health_service::HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One turn of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Token accounting as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input + self.output
    }
}

/// Output of one generation together with who produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub text: String,
    pub provider: LlmProvider,
    pub model: String,
    /// `None` when the provider does not report usage.
    pub usage: Option<TokenUsage>,
}

/// A single LLM provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn provider(&self) -> LlmProvider;

    fn model(&self) -> &str;

    /// Non-streaming completion over the given conversation.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation>;

    /// Resilient health check; never fails, errors map to `ok = false`.
    async fn health(&self) -> HealthStatus;
}
