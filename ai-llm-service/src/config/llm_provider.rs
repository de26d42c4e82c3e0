use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for large language model (LLM) inference.
///
/// # Examples
///
/// ```
/// use ai_llm_service::LlmProvider;
///
/// let p: LlmProvider = "sagemaker".parse().unwrap();
/// assert_eq!(p, LlmProvider::Sagemaker);
/// assert_eq!(p.as_str(), "sagemaker");
/// ```
///
/// Adding more providers in the future can be done by extending this enum
/// and implementing [`crate::LlmBackend`] for the new client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions API.
    #[serde(rename = "openai")]
    OpenAI,
    /// AWS Sagemaker real-time inference endpoint.
    Sagemaker,
}

impl LlmProvider {
    /// Stable lowercase identifier used in configs and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Sagemaker => "sagemaker",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAI),
            "sagemaker" => Ok(LlmProvider::Sagemaker),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Caller preference for which provider should serve a request.
///
/// `Auto` picks the first healthy provider in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreference {
    #[serde(rename = "openai")]
    OpenAI,
    Sagemaker,
    #[default]
    Auto,
}

impl ProviderPreference {
    /// The explicitly requested provider, if any.
    pub fn explicit(&self) -> Option<LlmProvider> {
        match self {
            ProviderPreference::OpenAI => Some(LlmProvider::OpenAI),
            ProviderPreference::Sagemaker => Some(LlmProvider::Sagemaker),
            ProviderPreference::Auto => None,
        }
    }
}

impl From<LlmProvider> for ProviderPreference {
    fn from(p: LlmProvider) -> Self {
        match p {
            LlmProvider::OpenAI => ProviderPreference::OpenAI,
            LlmProvider::Sagemaker => ProviderPreference::Sagemaker,
        }
    }
}

impl FromStr for ProviderPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(ProviderPreference::Auto);
        }
        s.parse::<LlmProvider>().map(ProviderPreference::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preferences_case_insensitively() {
        assert_eq!("AUTO".parse::<ProviderPreference>().unwrap(), ProviderPreference::Auto);
        assert_eq!(
            " OpenAI ".parse::<ProviderPreference>().unwrap(),
            ProviderPreference::OpenAI
        );
        assert!("anthropic".parse::<ProviderPreference>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_ids() {
        let v = serde_json::to_value(LlmProvider::OpenAI).unwrap();
        assert_eq!(v, serde_json::json!("openai"));
        let p: ProviderPreference = serde_json::from_value(serde_json::json!("sagemaker")).unwrap();
        assert_eq!(p.explicit(), Some(LlmProvider::Sagemaker));
    }
}
