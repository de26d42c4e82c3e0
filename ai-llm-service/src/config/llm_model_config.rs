use crate::config::{aws_credentials::AwsCredentials, llm_provider::LlmProvider};

/// Configuration for an LLM model invocation.
///
/// This struct contains both general and provider-specific parameters.
///
/// # Fields
///
/// - `provider`: Which LLM provider/backend to use (OpenAI, Sagemaker).
/// - `model`: The model identifier. For Sagemaker this is the endpoint name.
/// - `endpoint`: The inference base URL (OpenAI API base or Sagemaker runtime host).
/// - `api_key`: Optional API key for providers that require bearer authentication.
/// - `aws`: Optional AWS credentials for SigV4-signed providers.
/// - `max_tokens`: Maximum number of tokens to generate (if supported).
/// - `temperature`: Controls randomness (0.0 = deterministic, >1.0 = more random).
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: Optional request timeout in seconds.
///
/// # Examples
///
/// ```
/// use ai_llm_service::{LlmModelConfig, LlmProvider};
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::OpenAI,
///     model: "gpt-4.1-nano-2025-04-14".to_string(),
///     endpoint: "https://api.openai.com".to_string(),
///     api_key: Some("sk-...".to_string()),
///     aws: None,
///     max_tokens: Some(2048),
///     temperature: Some(0.7),
///     top_p: None,
///     timeout_secs: Some(30),
/// };
/// assert_eq!(cfg.provider, LlmProvider::OpenAI);
/// ```
#[derive(Debug, Clone)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string (e.g., `"gpt-4.1-nano-2025-04-14"`).
    pub model: String,

    /// Inference endpoint base URL.
    pub endpoint: String,

    /// Optional API key for authentication (e.g., OpenAI).
    pub api_key: Option<String>,

    /// Optional AWS credentials (Sagemaker).
    pub aws: Option<AwsCredentials>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature (controls creativity).
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}
