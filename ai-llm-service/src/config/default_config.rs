//! Default LLM configs loaded strictly from environment variables.
//!
//! This module provides convenience constructors for [`LlmModelConfig`],
//! one per provider, plus the selection knobs used by
//! [`crate::ProviderSelector`].
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_PROVIDER`        = `auto` | `openai` | `sagemaker` (default `auto`)
//! - `LLM_PRIORITY`        = comma-separated provider order (default `openai,sagemaker`)
//! - `LLM_HEALTH_TTL_SECS` = health cache lifetime (default 30)
//! - `LLM_MAX_TOKENS`      = optional max tokens (u32)
//! - `LLM_TIMEOUT_SECS`    = request timeout (default 120)
//!
//! OpenAI (configured only when `OPENAI_API_KEY` is set):
//! - `OPENAI_BASE_URL`     = API base (default `https://api.openai.com`)
//! - `LLM_MODEL`           = model id or alias `nano` | `mini` | `4o-mini`
//! - `OPENAI_TEMPERATURE`  = default 0.7
//!
//! Sagemaker (configured only when AWS credentials are present):
//! - `SAGEMAKER_ENDPOINT`    = endpoint name (default `GeoGPT-R1-Sagemaker-Endpoint`)
//! - `AWS_REGION`            = default `us-east-1`
//! - `SAGEMAKER_TEMPERATURE` = default 0.7

use std::time::Duration;

use tracing::{info, warn};

use crate::{
    config::{
        aws_credentials::AwsCredentials,
        llm_model_config::LlmModelConfig,
        llm_provider::{LlmProvider, ProviderPreference},
    },
    error_handler::{
        ConfigError, Result, env_opt, env_opt_f32, env_opt_u32, env_opt_u64,
        validate_http_endpoint, validate_range_f32,
    },
};

pub const GPT_4_1_NANO: &str = "gpt-4.1-nano-2025-04-14";
pub const GPT_4_1_MINI: &str = "gpt-4.1-mini-2025-04-14";
pub const GPT_4O_MINI: &str = "gpt-4o-mini-2024-07-18";

pub const DEFAULT_SAGEMAKER_ENDPOINT: &str = "GeoGPT-R1-Sagemaker-Endpoint";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TOP_P: f32 = 0.95;

/// Maps a model name or short alias to a known OpenAI model id.
///
/// Unknown names fall back to the cheapest model.
pub fn resolve_openai_model(name: &str) -> &'static str {
    match name.trim().to_ascii_lowercase().as_str() {
        "gpt-4.1-mini-2025-04-14" | "mini" => GPT_4_1_MINI,
        "gpt-4o-mini-2024-07-18" | "4o-mini" => GPT_4O_MINI,
        "gpt-4.1-nano-2025-04-14" | "nano" => GPT_4_1_NANO,
        other => {
            warn!(model = other, "unknown LLM_MODEL; using {GPT_4_1_NANO}");
            GPT_4_1_NANO
        }
    }
}

fn temperature(var: &'static str) -> Result<f32> {
    let t = env_opt_f32(var)?.unwrap_or(0.7);
    validate_range_f32("temperature", t, 0.0, 2.0)?;
    Ok(t)
}

fn timeout_secs() -> Result<u64> {
    Ok(env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS))
}

/// Constructs the OpenAI config, or `None` when `OPENAI_API_KEY` is unset.
///
/// # Errors
/// - [`ConfigError::InvalidNumber`] / [`ConfigError::OutOfRange`] for bad knobs
/// - [`ConfigError::InvalidFormat`] if `OPENAI_BASE_URL` is not http(s)
pub fn config_openai() -> Result<Option<LlmModelConfig>> {
    let Some(api_key) = env_opt("OPENAI_API_KEY") else {
        return Ok(None);
    };
    let endpoint =
        env_opt("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com".to_string());
    validate_http_endpoint("OPENAI_BASE_URL", &endpoint)?;

    let model = resolve_openai_model(&env_opt("LLM_MODEL").unwrap_or_else(|| GPT_4_1_NANO.into()));

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: model.to_string(),
        endpoint,
        api_key: Some(api_key),
        aws: None,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(temperature("OPENAI_TEMPERATURE")?),
        top_p: Some(DEFAULT_TOP_P),
        timeout_secs: Some(timeout_secs()?),
    }))
}

/// Constructs the Sagemaker config, or `None` when AWS credentials are absent.
///
/// The endpoint URL is the regional runtime host; the model is the endpoint name.
pub fn config_sagemaker() -> Result<Option<LlmModelConfig>> {
    let aws = match AwsCredentials::from_env() {
        Ok(c) => c,
        Err(_) => return Ok(None),
    };
    let endpoint_name =
        env_opt("SAGEMAKER_ENDPOINT").unwrap_or_else(|| DEFAULT_SAGEMAKER_ENDPOINT.to_string());
    let endpoint = format!("https://runtime.sagemaker.{}.amazonaws.com", aws.region);

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::Sagemaker,
        model: endpoint_name,
        endpoint,
        api_key: None,
        aws: Some(aws),
        max_tokens: Some(env_opt_u32("LLM_MAX_TOKENS")?.unwrap_or(2048)),
        temperature: Some(temperature("SAGEMAKER_TEMPERATURE")?),
        top_p: Some(DEFAULT_TOP_P),
        timeout_secs: Some(timeout_secs()?),
    }))
}

/// All providers that can be configured from the current environment.
///
/// # Errors
/// [`ConfigError::NoProviders`] when neither provider is configured.
pub fn configured_providers() -> Result<Vec<LlmModelConfig>> {
    let mut out = Vec::with_capacity(2);
    if let Some(c) = config_openai()? {
        info!(model = %c.model, "OpenAI provider configured");
        out.push(c);
    }
    if let Some(c) = config_sagemaker()? {
        info!(endpoint = %c.model, "Sagemaker provider configured");
        out.push(c);
    }
    if out.is_empty() {
        return Err(ConfigError::NoProviders.into());
    }
    Ok(out)
}

/// `LLM_PROVIDER` (default `auto`).
pub fn provider_preference() -> Result<ProviderPreference> {
    match env_opt("LLM_PROVIDER") {
        Some(v) => Ok(v.parse::<ProviderPreference>()?),
        None => Ok(ProviderPreference::Auto),
    }
}

/// `LLM_PRIORITY` (default `openai,sagemaker`). Duplicates are ignored.
pub fn provider_priority() -> Result<Vec<LlmProvider>> {
    let raw = env_opt("LLM_PRIORITY").unwrap_or_else(|| "openai,sagemaker".to_string());
    parse_priority(&raw)
}

fn parse_priority(raw: &str) -> Result<Vec<LlmProvider>> {
    let mut out: Vec<LlmProvider> = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let p = part.parse::<LlmProvider>()?;
        if !out.contains(&p) {
            out.push(p);
        }
    }
    Ok(out)
}

/// `LLM_HEALTH_TTL_SECS` (default 30).
pub fn health_ttl() -> Result<Duration> {
    Ok(Duration::from_secs(
        env_opt_u64("LLM_HEALTH_TTL_SECS")?.unwrap_or(30),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_aliases_resolve() {
        assert_eq!(resolve_openai_model("nano"), GPT_4_1_NANO);
        assert_eq!(resolve_openai_model("MINI"), GPT_4_1_MINI);
        assert_eq!(resolve_openai_model("4o-mini"), GPT_4O_MINI);
        assert_eq!(resolve_openai_model("something-else"), GPT_4_1_NANO);
    }

    #[test]
    fn priority_parsing_dedups_and_rejects_unknown() {
        let p = parse_priority("sagemaker, openai,sagemaker").unwrap();
        assert_eq!(p, vec![LlmProvider::Sagemaker, LlmProvider::OpenAI]);
        assert!(parse_priority("openai,bard").is_err());
    }
}
