//! Universal health service for LLM backends (OpenAI, Sagemaker).
//!
//! This module exposes lightweight health checks for supported providers:
//! - OpenAI: `GET {endpoint}/v1/models` with Bearer auth (best-effort model existence check)
//! - Sagemaker: signed `DescribeEndpoint` call; healthy when `EndpointStatus == InService`
//!
//! The returned [`HealthStatus`] is JSON-serializable and suitable for a `/health` endpoint.
//! [`HealthService::check`] is resilient and never fails (errors mapped to `ok=false`).
//! Provider-specific checks (`try_*`) return strict `Result`.

use std::time::{Duration, Instant};

use reqwest::header;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, HealthError, HttpError, make_snippet};
use crate::services::aws_sigv4::{self, SigningRequest};

/// A serializable health snapshot for a single provider/config.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Backend/provider (e.g., "openai", "sagemaker").
    pub provider: String,
    /// Target endpoint base URL.
    pub endpoint: String,
    /// Optional model identifier relevant to the check (if any).
    pub model: Option<String>,
    /// Overall health flag.
    pub ok: bool,
    /// Measured HTTP latency in milliseconds for the main check.
    pub latency_ms: u128,
    /// Short human-readable message with details.
    pub message: String,
}

impl HealthStatus {
    #[inline]
    pub fn ok(
        provider: LlmProvider,
        endpoint: &str,
        model: Option<&str>,
        latency_ms: u128,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            model: model.map(str::to_string),
            ok: true,
            latency_ms,
            message: message.into(),
        }
    }

    #[inline]
    pub fn fail(
        provider: LlmProvider,
        endpoint: &str,
        model: Option<&str>,
        latency_ms: u128,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            model: model.map(str::to_string),
            ok: false,
            latency_ms,
            message: message.into(),
        }
    }
}

/// A universal health checker that reuses a single HTTP client.
///
/// The client is constructed with a default timeout. Individual checks may
/// override the timeout per request based on the provided config.
#[derive(Debug)]
pub struct HealthService {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HealthService {
    /// Creates a new health service with an optional client timeout (seconds).
    ///
    /// # Errors
    /// Returns [`AiLlmError::HttpTransport`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, AiLlmError> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(10));
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        debug!(
            default_timeout_secs = timeout.as_secs(),
            "HealthService initialized"
        );

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Checks health for a single LLM config, routing to the provider-specific check.
    ///
    /// This method is **resilient**: it never returns an error. Any failure is converted
    /// to `HealthStatus { ok: false, message: ... }`.
    pub async fn check(&self, cfg: &LlmModelConfig) -> HealthStatus {
        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            warn!(
                provider = %cfg.provider,
                endpoint = %cfg.endpoint,
                "invalid endpoint (empty or missing http/https)"
            );
            return HealthStatus::fail(
                cfg.provider,
                endpoint,
                Some(&cfg.model),
                0,
                "endpoint is empty or missing http/https",
            );
        }

        let start = Instant::now();
        let result = match cfg.provider {
            LlmProvider::OpenAI => self.try_check_openai(cfg).await,
            LlmProvider::Sagemaker => self.try_check_sagemaker(cfg).await,
        };

        match result {
            Ok(mut status) => {
                if status.latency_ms == 0 {
                    status.latency_ms = start.elapsed().as_millis();
                }
                info!(
                    provider = %status.provider,
                    model = %status.model.as_deref().unwrap_or("n/a"),
                    ok = status.ok,
                    latency_ms = status.latency_ms,
                    "health check completed"
                );
                status
            }
            Err(err) => {
                let status = HealthStatus::fail(
                    cfg.provider,
                    &cfg.endpoint,
                    Some(&cfg.model),
                    start.elapsed().as_millis(),
                    err.to_string(),
                );
                warn!(
                    provider = %status.provider,
                    endpoint = %status.endpoint,
                    latency_ms = status.latency_ms,
                    message = %status.message,
                    "health check failed"
                );
                status
            }
        }
    }

    fn timeout_for(&self, cfg: &LlmModelConfig) -> Duration {
        cfg.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
            .min(self.default_timeout)
    }

    /// Strict OpenAI check. Returns an error on hard failures.
    ///
    /// Request:
    /// - `GET {endpoint}/v1/models` with `Authorization: Bearer <api_key>`
    /// - Ensure 2xx
    /// - Best-effort: verify `cfg.model` exists in the returned list
    async fn try_check_openai(&self, cfg: &LlmModelConfig) -> Result<HealthStatus, AiLlmError> {
        let base = cfg.endpoint.trim_end_matches('/');
        let url = format!("{base}/v1/models");

        let api_key = cfg.api_key.as_ref().ok_or_else(|| {
            AiLlmError::Health(HealthError::Decode("missing OpenAI API key".into()))
        })?;

        let auth_header =
            header::HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                AiLlmError::Health(HealthError::Decode(format!("invalid API key header: {e}")))
            })?;

        let start = Instant::now();
        debug!(provider = "openai", model = %cfg.model, "GET {}", url);

        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout_for(cfg))
            .header(header::AUTHORIZATION, auth_header)
            .send()
            .await?;

        let latency = start.elapsed().as_millis();

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);

            error!(
                provider = "openai",
                %url,
                %status,
                %snippet,
                latency_ms = latency,
                "health GET /v1/models returned non-success status"
            );

            return Err(HealthError::HttpStatus(HttpError {
                status,
                url,
                snippet,
            })
            .into());
        }

        // Expected minimal JSON: { "data": [ { "id": "<model>" }, ... ] }
        #[derive(serde::Deserialize)]
        struct ModelItem {
            id: String,
        }
        #[derive(serde::Deserialize)]
        struct Models {
            data: Vec<ModelItem>,
        }

        match resp.json::<Models>().await {
            Ok(models) if models.data.iter().any(|m| m.id == cfg.model) => Ok(HealthStatus::ok(
                cfg.provider,
                &cfg.endpoint,
                Some(&cfg.model),
                latency,
                "OpenAI is healthy; model is available",
            )),
            Ok(_) => Ok(HealthStatus::fail(
                cfg.provider,
                &cfg.endpoint,
                Some(&cfg.model),
                latency,
                "OpenAI is up, but model not found in /v1/models",
            )),
            Err(e) => {
                warn!(
                    provider = "openai",
                    error = %e,
                    latency_ms = latency,
                    "failed to decode /v1/models; treating server as reachable"
                );
                Ok(HealthStatus::ok(
                    cfg.provider,
                    &cfg.endpoint,
                    Some(&cfg.model),
                    latency,
                    format!("OpenAI is reachable; failed to decode /v1/models: {e}"),
                ))
            }
        }
    }

    /// Strict Sagemaker check.
    ///
    /// Request:
    /// - signed `POST https://api.sagemaker.{region}.amazonaws.com/`
    ///   with `X-Amz-Target: SageMaker.DescribeEndpoint`
    /// - healthy iff `EndpointStatus == "InService"`
    async fn try_check_sagemaker(&self, cfg: &LlmModelConfig) -> Result<HealthStatus, AiLlmError> {
        let creds = cfg.aws.as_ref().ok_or_else(|| {
            AiLlmError::Health(HealthError::Decode("missing AWS credentials".into()))
        })?;

        let host = format!("api.sagemaker.{}.amazonaws.com", creds.region);
        let url = format!("https://{host}/");
        let body = serde_json::json!({ "EndpointName": cfg.model }).to_string();

        let signed = aws_sigv4::sign(
            creds,
            &SigningRequest {
                method: "POST",
                host: &host,
                path: "/",
                service: "sagemaker",
                payload: body.as_bytes(),
                headers: &[
                    ("content-type", "application/x-amz-json-1.1"),
                    ("x-amz-target", "SageMaker.DescribeEndpoint"),
                ],
            },
            chrono::Utc::now(),
        );

        let start = Instant::now();
        debug!(provider = "sagemaker", endpoint_name = %cfg.model, "POST {} DescribeEndpoint", url);

        let mut req = self
            .client
            .post(&url)
            .timeout(self.timeout_for(cfg))
            .body(body);
        for (k, v) in &signed {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req.send().await?;
        let latency = start.elapsed().as_millis();

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(
                provider = "sagemaker",
                %url,
                %status,
                %snippet,
                latency_ms = latency,
                "DescribeEndpoint returned non-success status"
            );
            return Err(HealthError::HttpStatus(HttpError {
                status,
                url,
                snippet,
            })
            .into());
        }

        #[derive(serde::Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct Described {
            endpoint_status: String,
        }

        let described: Described = resp
            .json()
            .await
            .map_err(|e| HealthError::Decode(format!("DescribeEndpoint: {e}")))?;

        if described.endpoint_status == "InService" {
            Ok(HealthStatus::ok(
                cfg.provider,
                &cfg.endpoint,
                Some(&cfg.model),
                latency,
                "Sagemaker endpoint is InService",
            ))
        } else {
            Ok(HealthStatus::fail(
                cfg.provider,
                &cfg.endpoint,
                Some(&cfg.model),
                latency,
                format!("Sagemaker endpoint status: {}", described.endpoint_status),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_endpoint_is_reported_not_raised() {
        let svc = HealthService::new(Some(1)).unwrap();
        let cfg = LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "m".into(),
            endpoint: "ftp://nope".into(),
            api_key: Some("k".into()),
            aws: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: None,
        };
        let st = svc.check(&cfg).await;
        assert!(!st.ok);
        assert_eq!(st.provider, "openai");
        assert_eq!(st.latency_ms, 0);
    }
}
