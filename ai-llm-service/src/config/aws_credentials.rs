use crate::error_handler::{Result, must_env};

/// Static AWS credentials used to sign Sagemaker requests.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
}

impl AwsCredentials {
    /// Loads credentials from the standard AWS environment variables.
    ///
    /// `AWS_REGION` defaults to `us-east-1`.
    ///
    /// # Errors
    /// Returns [`crate::error_handler::ConfigError::MissingVar`] when the key id
    /// or secret is absent.
    pub fn from_env() -> Result<Self> {
        let access_key_id = must_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = must_env("AWS_SECRET_ACCESS_KEY")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let region = std::env::var("AWS_REGION")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "us-east-1".to_string());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
            region,
        })
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &"***")
            .field("region", &self.region)
            .field("has_session_token", &self.session_token.is_some())
            .finish()
    }
}
