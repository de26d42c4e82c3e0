//! LLM provider inspection and switching.

use std::sync::Arc;

use ai_llm_service::{AiLlmError, HealthStatus, LlmProvider, ProviderPreference};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    core::app_state::AppState,
    error_handler::{AppError, AppResult},
    middleware_layer::error_envelope::request_id,
};

#[derive(Debug, Serialize)]
pub struct ProvidersReply {
    /// Configured providers in priority order.
    pub available_providers: Vec<LlmProvider>,
    pub current_provider: Option<LlmProvider>,
    pub default_preference: ProviderPreference,
    pub health_status: Vec<HealthStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SetProviderRequest {
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct SetProviderReply {
    pub message: String,
    pub current_provider: LlmProvider,
}

/// Handler: GET /llm/providers
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersReply> {
    let llm = state.llm();
    let (available_providers, current_provider, health_status) =
        tokio::join!(llm.providers(), llm.primary(), llm.health_all());

    Json(ProvidersReply {
        available_providers,
        current_provider,
        default_preference: llm.default_preference(),
        health_status,
    })
}

/// Handler: POST /llm/provider
///
/// Moves the named provider to the head of the fallback chain.
pub async fn set_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SetProviderRequest>, JsonRejection>,
) -> AppResult<Json<SetProviderReply>> {
    let Json(req) = payload?;

    let provider: LlmProvider = req.provider.parse().map_err(|_| AppError::BadRequest {
        message: format!("unknown provider '{}'", req.provider),
        path: Some("provider".into()),
    })?;

    state
        .llm()
        .set_primary(provider)
        .await
        .map_err(|e| match e {
            AiLlmError::ProviderNotConfigured(p) => AppError::BadRequest {
                message: format!("provider '{p}' is not configured"),
                path: Some("provider".into()),
            },
            other => other.into(),
        })?;

    info!(request_id = %request_id(&headers), %provider, "primary provider switched");
    Ok(Json(SetProviderReply {
        message: format!("Primary provider set to {provider}"),
        current_provider: provider,
    }))
}
