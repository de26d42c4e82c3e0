use ai_llm_service::AiLlmError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use contextor::ContextorError;
use deep_discovery::DiscoveryError;
use rag_store::RagError;
use services::SandboxError;
use thiserror::Error;
use tracing::error;

use crate::core::http::response_envelope::{ApiErrorDetail, ApiResponse};

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error("configuration error: {0}")]
    Config(String),

    // --- IO / server ---
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),

    // --- Request ---
    #[error("{message}")]
    BadRequest {
        message: String,
        path: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Rich HTTP error mapped from lower layers with specific status & code.
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
            path: None,
        }
    }

    fn upstream(message: impl Into<String>) -> Self {
        AppError::Http {
            status: StatusCode::BAD_GATEWAY,
            code: "UPSTREAM_ERROR",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        AppError::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Http { status, .. } => *status,
            AppError::Config(_) | AppError::Bind(_) | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Bind(_) => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest { .. } => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Http { code, .. } => code,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), error = %self, "request failed");
        }
        let details = match &self {
            AppError::BadRequest {
                path: Some(path), ..
            } => vec![ApiErrorDetail {
                path: Some(path.clone()),
                hint: None,
            }],
            _ => Vec::new(),
        };
        ApiResponse::error(self.error_code(), self.to_string(), details)
            .into_response_with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

/// Malformed JSON and payloads that do not match the DTO are both 400.
impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::bad_request(err.body_text())
    }
}

impl From<ContextorError> for AppError {
    fn from(err: ContextorError) -> Self {
        match err {
            ContextorError::InvalidRequest(msg) => AppError::bad_request(msg),
            ContextorError::Config(msg) => AppError::Config(msg),
            ContextorError::Llm(e) => e.into(),
            ContextorError::Rag(e) => e.into(),
            e @ (ContextorError::Http { .. } | ContextorError::WebDecode { .. }) => {
                AppError::upstream(e.to_string())
            }
        }
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Config(msg) => AppError::Config(msg),
            other => AppError::upstream(format!("retrieval error: {other}")),
        }
    }
}

impl From<AiLlmError> for AppError {
    fn from(err: AiLlmError) -> Self {
        if err.is_unavailable() {
            AppError::Http {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "NO_PROVIDER",
                message: err.to_string(),
            }
        } else if matches!(err, AiLlmError::Config(_)) {
            AppError::Config(err.to_string())
        } else {
            AppError::upstream(err.to_string())
        }
    }
}

impl From<DiscoveryError> for AppError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::NotFound(_) => AppError::NotFound(err.to_string()),
            DiscoveryError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            DiscoveryError::InvalidRequest(msg) => AppError::bad_request(msg),
            DiscoveryError::StepFailed { .. } => AppError::upstream(err.to_string()),
            DiscoveryError::Store(_) | DiscoveryError::Config(_) => {
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<SandboxError> for AppError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::NotFound(_) => AppError::NotFound(err.to_string()),
            SandboxError::Io(_) => AppError::internal(err.to_string()),
            SandboxError::UnsupportedLanguage(_) => AppError::BadRequest {
                message: err.to_string(),
                path: Some("language".into()),
            },
            SandboxError::InvalidTimeout(_) => AppError::BadRequest {
                message: err.to_string(),
                path: Some("timeout".into()),
            },
            SandboxError::EmptyCode => AppError::BadRequest {
                message: err.to_string(),
                path: Some("code".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_llm_service::LlmProvider;

    #[test]
    fn llm_unavailability_is_503_and_other_failures_502() {
        let e: AppError = AiLlmError::NoProviderAvailable("all down".into()).into();
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.error_code(), "NO_PROVIDER");

        let e: AppError = AiLlmError::ProviderNotConfigured(LlmProvider::Sagemaker).into();
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let e: AppError = AiLlmError::Timeout(std::time::Duration::from_secs(1)).into();
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(e.error_code(), "UPSTREAM_ERROR");
    }

    #[test]
    fn discovery_errors_map_to_client_statuses() {
        use deep_discovery::DiscoveryStatus;

        let e: AppError = DiscoveryError::NotFound("discovery_x".into()).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);

        let e: AppError = DiscoveryError::InvalidTransition {
            id: "discovery_x".into(),
            from: DiscoveryStatus::Completed,
            to: DiscoveryStatus::Paused,
        }
        .into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
        assert_eq!(e.error_code(), "CONFLICT");
    }

    #[test]
    fn contextor_errors_unwrap_to_their_cause() {
        let e: AppError = ContextorError::InvalidRequest("message must not be empty".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);

        let e: AppError = ContextorError::Rag(RagError::VectorSizeMismatch { got: 3, want: 4 }).into();
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);

        let e: AppError =
            ContextorError::Llm(AiLlmError::NoProviderAvailable("none".into())).into();
        assert_eq!(e.error_code(), "NO_PROVIDER");
    }

    #[test]
    fn sandbox_validation_points_at_the_field() {
        let e: AppError = SandboxError::InvalidTimeout(500).into();
        match e {
            AppError::BadRequest { path, .. } => assert_eq!(path.as_deref(), Some("timeout")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
