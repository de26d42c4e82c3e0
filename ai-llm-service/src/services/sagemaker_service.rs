//! AWS Sagemaker real-time inference client (text-generation containers).
//!
//! - POST https://runtime.sagemaker.{region}.amazonaws.com/endpoints/{name}/invocations
//!   signed with SigV4 (service `sagemaker`)
//!
//! Chat messages are flattened into a single `System:/Human:/Assistant:`
//! prompt; the echoed prompt prefix is stripped from the output.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    backend::{ChatMessage, ChatRole, Generation, LlmBackend},
    config::{
        aws_credentials::AwsCredentials, llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::{AiLlmError, HttpError, ProviderError, ProviderErrorKind, make_snippet},
    health_service::{HealthService, HealthStatus},
    services::aws_sigv4::{self, SigningRequest},
};

const MAX_NEW_TOKENS: u32 = 2048;

#[derive(Debug)]
pub struct SagemakerService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    creds: AwsCredentials,
    host: String,
    path: String,
    health: HealthService,
}

impl SagemakerService {
    /// Creates a new client.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not Sagemaker
    /// - `MissingCredentials` if `cfg.aws` is `None`
    /// - `InvalidEndpoint` if the runtime URL is not https
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::Sagemaker {
            return Err(ProviderError::new(
                LlmProvider::Sagemaker,
                ProviderErrorKind::InvalidProvider,
            )
            .into());
        }
        let creds = cfg.aws.clone().ok_or_else(|| {
            ProviderError::new(LlmProvider::Sagemaker, ProviderErrorKind::MissingCredentials)
        })?;

        let host = cfg
            .endpoint
            .trim()
            .strip_prefix("https://")
            .map(|h| h.trim_end_matches('/').to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                ProviderError::new(
                    LlmProvider::Sagemaker,
                    ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
                )
            })?;
        let path = format!(
            "/endpoints/{}/invocations",
            aws_sigv4::uri_encode(&cfg.model)
        );

        let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(120));
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        info!(
            endpoint_name = %cfg.model,
            region = %creds.region,
            timeout_secs = timeout.as_secs(),
            "SagemakerService initialized"
        );

        Ok(Self {
            client,
            cfg,
            creds,
            host,
            path,
            health: HealthService::new(Some(10))?,
        })
    }

    /// Invokes the endpoint with the flattened prompt.
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses
    /// - `Decode` for non-JSON bodies
    /// - `EmptyOutput` if the model returned nothing after prompt stripping
    pub async fn invoke(&self, messages: &[ChatMessage]) -> Result<Generation, AiLlmError> {
        let started = Instant::now();
        let prompt = messages_to_prompt(messages);
        let payload = InvocationRequest {
            inputs: &prompt,
            parameters: InvocationParameters {
                temperature: self.cfg.temperature.unwrap_or(0.7),
                top_p: self.cfg.top_p.unwrap_or(0.95),
                max_new_tokens: self.cfg.max_tokens.unwrap_or(MAX_NEW_TOKENS),
                do_sample: true,
            },
        };
        let body = serde_json::to_vec(&payload).map_err(|e| {
            ProviderError::new(LlmProvider::Sagemaker, ProviderErrorKind::Decode(e.to_string()))
        })?;

        let signed = aws_sigv4::sign(
            &self.creds,
            &SigningRequest {
                method: "POST",
                host: &self.host,
                path: &self.path,
                service: "sagemaker",
                payload: &body,
                headers: &[("content-type", "application/json")],
            },
            chrono::Utc::now(),
        );

        let url = format!("https://{}{}", self.host, self.path);
        debug!(endpoint_name = %self.cfg.model, prompt_len = prompt.len(), "POST {}", url);

        let mut req = self.client.post(&url).body(body);
        for (k, v) in &signed {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(
                %status,
                %url,
                %snippet,
                latency_ms = started.elapsed().as_millis(),
                "Sagemaker invocation returned non-success status"
            );
            return Err(ProviderError::new(
                LlmProvider::Sagemaker,
                ProviderErrorKind::HttpStatus(HttpError {
                    status,
                    url,
                    snippet,
                }),
            )
            .into());
        }

        let value: Value = resp.json().await.map_err(|e| {
            ProviderError::new(
                LlmProvider::Sagemaker,
                ProviderErrorKind::Decode(format!("serde error: {e}")),
            )
        })?;

        let text = extract_generated_text(&value, &prompt);
        if text.is_empty() {
            return Err(
                ProviderError::new(LlmProvider::Sagemaker, ProviderErrorKind::EmptyOutput).into(),
            );
        }

        info!(
            endpoint_name = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "sagemaker invocation completed"
        );

        Ok(Generation {
            text,
            provider: LlmProvider::Sagemaker,
            model: self.cfg.model.clone(),
            usage: None,
        })
    }
}

#[async_trait]
impl LlmBackend for SagemakerService {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Sagemaker
    }

    fn model(&self) -> &str {
        &self.cfg.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<Generation, AiLlmError> {
        self.invoke(messages).await
    }

    async fn health(&self) -> HealthStatus {
        self.health.check(&self.cfg).await
    }
}

#[derive(Serialize)]
struct InvocationRequest<'a> {
    inputs: &'a str,
    parameters: InvocationParameters,
}

#[derive(Serialize)]
struct InvocationParameters {
    temperature: f32,
    top_p: f32,
    max_new_tokens: u32,
    do_sample: bool,
}

/// Flattens chat turns into the plain-text prompt expected by TGI containers.
pub fn messages_to_prompt(messages: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = messages
        .iter()
        .map(|m| match m.role {
            ChatRole::System => format!("System: {}", m.content),
            ChatRole::User => format!("Human: {}", m.content),
            ChatRole::Assistant => format!("Assistant: {}", m.content),
        })
        .collect();
    parts.push("Assistant:".to_string());
    parts.join("\n\n")
}

/// Accepts `[{"generated_text": ..}]`, `{"generated_text": ..}`,
/// `{"outputs": ..}` or a bare string.
fn extract_generated_text(value: &Value, prompt: &str) -> String {
    let raw = match value {
        Value::Array(items) => match items.first() {
            Some(Value::Object(o)) => o
                .get("generated_text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        Value::Object(o) => o
            .get("generated_text")
            .or_else(|| o.get("outputs"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match raw.strip_prefix(prompt) {
        Some(rest) => rest.trim().to_string(),
        None => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_flattening_ends_with_assistant_turn() {
        let msgs = vec![ChatMessage::system("sys"), ChatMessage::user("q")];
        assert_eq!(
            messages_to_prompt(&msgs),
            "System: sys\n\nHuman: q\n\nAssistant:"
        );
    }

    #[test]
    fn extracts_text_from_supported_shapes() {
        let p = "Human: hi\n\nAssistant:";
        assert_eq!(
            extract_generated_text(&json!([{ "generated_text": format!("{p} hello") }]), p),
            "hello"
        );
        assert_eq!(
            extract_generated_text(&json!({ "generated_text": "plain" }), p),
            "plain"
        );
        assert_eq!(extract_generated_text(&json!({ "outputs": "o" }), p), "o");
        assert_eq!(extract_generated_text(&json!([]), p), "");
    }

    #[test]
    fn rejects_non_https_runtime() {
        let cfg = LlmModelConfig {
            provider: LlmProvider::Sagemaker,
            model: "GeoGPT".into(),
            endpoint: "http://localhost".into(),
            api_key: None,
            aws: Some(AwsCredentials {
                access_key_id: "a".into(),
                secret_access_key: "b".into(),
                session_token: None,
                region: "us-east-1".into(),
            }),
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: None,
        };
        assert!(SagemakerService::new(cfg).is_err());
    }
}
