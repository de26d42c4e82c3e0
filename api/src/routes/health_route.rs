//! GET /health: reachability of every collaborator.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::core::app_state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Offline,
}

impl From<bool> for Availability {
    fn from(ok: bool) -> Self {
        if ok {
            Availability::Online
        } else {
            Availability::Offline
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub embedding: Availability,
    pub reranking: Availability,
    pub vector_store: Availability,
    /// Online when at least one configured provider passes its health check.
    pub llm: Availability,
}

impl ServiceHealth {
    fn all_online(&self) -> bool {
        [self.embedding, self.reranking, self.vector_store, self.llm]
            .iter()
            .all(|a| *a == Availability::Online)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `online` when every service is up, `degraded` otherwise.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceHealth,
    pub version: &'static str,
    pub uptime_secs: i64,
}

/// Handler: GET /health
///
/// Always 200; a failing dependency only degrades the report.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let (embedding, reranking, vector_store, llm) = tokio::join!(
        state.rag.embedder.health(),
        state.rag.reranker.health(),
        state.rag.store.health(),
        state.llm().health_all(),
    );

    let services = ServiceHealth {
        embedding: embedding.into(),
        reranking: reranking.into(),
        vector_store: vector_store.into(),
        llm: llm.iter().any(|h| h.ok).into(),
    };
    let status = if services.all_online() {
        "online"
    } else {
        warn!(?services, "health: degraded");
        "degraded"
    };

    let now = Utc::now();
    Json(HealthReport {
        status,
        timestamp: now,
        services,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (now - state.started_at).num_seconds(),
    })
}
