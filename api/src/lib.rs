//! HTTP surface of the GeoGPT-RAG service (axum).

use std::{env, sync::Arc};

pub mod core;
pub mod error_handler;
mod middleware_layer;
mod routes;

use axum::{
    Router,
    http::Uri,
    middleware,
    routing::{get, post},
};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::{
    core::app_state::AppState,
    error_handler::AppError,
    middleware_layer::error_envelope::json_error_mapper,
    routes::{
        chat_route::chat,
        code_routes::{execute_code, get_execution},
        config_route::get_config,
        discovery_routes::{
            get_discovery, list_discoveries, pause_discovery, resume_discovery, start_discovery,
        },
        health_route::health,
        kb_routes::ingest_document,
        llm_routes::{list_providers, set_provider},
    },
};

const DEFAULT_ADDRESS: &str = "0.0.0.0:8812";

/// All routes over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/discovery", get(list_discoveries))
        .route("/discovery/start", post(start_discovery))
        .route("/discovery/{id}", get(get_discovery))
        .route("/discovery/{id}/pause", post(pause_discovery))
        .route("/discovery/{id}/resume", post(resume_discovery))
        .route("/kb/documents", post(ingest_document))
        .route("/code/execute", post(execute_code))
        .route("/code/execution/{id}", get(get_execution))
        .route("/health", get(health))
        .route("/llm/providers", get(list_providers))
        .route("/llm/provider", post(set_provider))
        .route("/config", get(get_config))
        .fallback(unknown_route)
        .layer(middleware::from_fn(json_error_mapper))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn unknown_route(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}

/// Builds the state from the environment and serves until Ctrl+C.
///
/// # Errors
/// Configuration errors at boot, bind failures and server IO errors.
pub async fn start() -> Result<(), AppError> {
    let host_url = env::var("API_ADDRESS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

    let state = Arc::new(AppState::from_env()?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&host_url)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %host_url, "GeoGPT API listening");

    // Start server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("server stopped");
    Ok(())
}

/// Returns a future that resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal; running until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests;
