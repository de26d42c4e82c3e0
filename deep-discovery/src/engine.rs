//! Public entry point: start, observe, pause and resume discovery sessions.

use std::{sync::Arc, time::Duration};

use contextor::RagPipeline;
use serde::Serialize;
use services::short_id;
use tracing::info;

use crate::{
    error::DiscoveryError,
    model::{DiscoveryRequest, DiscoverySession, DiscoveryStatus},
    runner::Runner,
    store::SessionStore,
};

/// Timing knobs of the background runner.
#[derive(Clone, Debug)]
pub struct DiscoverySettings {
    /// How often a parked runner re-reads the session status.
    pub pause_poll: Duration,
    /// Pause between consecutive steps.
    pub step_delay: Duration,
    /// Rough per-step duration reported to clients at start.
    pub estimated_secs_per_step: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            pause_poll: Duration::from_millis(500),
            step_delay: Duration::from_millis(1000),
            estimated_secs_per_step: 30,
        }
    }
}

impl DiscoverySettings {
    /// `DISCOVERY_PAUSE_POLL_MS`, `DISCOVERY_STEP_DELAY_MS`.
    pub fn from_env() -> Result<Self, DiscoveryError> {
        let d = Self::default();
        Ok(Self {
            pause_poll: Duration::from_millis(parse_ms("DISCOVERY_PAUSE_POLL_MS", 500)?.max(1)),
            step_delay: Duration::from_millis(parse_ms("DISCOVERY_STEP_DELAY_MS", 1000)?),
            ..d
        })
    }
}

fn parse_ms(k: &str, dflt: u64) -> Result<u64, DiscoveryError> {
    match std::env::var(k).ok().filter(|v| !v.trim().is_empty()) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| DiscoveryError::Config(format!("{k} has an invalid value: '{v}'"))),
        None => Ok(dflt),
    }
}

/// Reply to a successful start.
#[derive(Clone, Debug, Serialize)]
pub struct DiscoveryStarted {
    pub discovery_id: String,
    pub status: DiscoveryStatus,
    /// Seconds.
    pub estimated_time: u64,
}

/// Owns the session store and spawns one runner task per session.
///
/// Construct once, wrap in `Arc`, and share through application state.
pub struct DiscoveryEngine {
    store: Arc<dyn SessionStore>,
    pipeline: Arc<RagPipeline>,
    settings: DiscoverySettings,
}

impl DiscoveryEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        pipeline: Arc<RagPipeline>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            store,
            pipeline,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Stores a new session in `starting` and spawns its runner.
    ///
    /// # Errors
    /// [`DiscoveryError::InvalidRequest`] for a bad request, or store errors.
    pub async fn start(&self, req: DiscoveryRequest) -> Result<DiscoveryStarted, DiscoveryError> {
        req.validate()?;

        let session = DiscoverySession::new(short_id("discovery"), &req);
        let id = session.id.clone();
        let planned = session.planned_steps() as u64;
        self.store.insert(session).await?;

        let runner = Runner {
            id: id.clone(),
            store: Arc::clone(&self.store),
            pipeline: Arc::clone(&self.pipeline),
            settings: self.settings.clone(),
        };
        tokio::spawn(runner.run());

        info!(discovery_id = %id, planned, query = %req.query, "discovery session created");
        Ok(DiscoveryStarted {
            discovery_id: id,
            status: DiscoveryStatus::Starting,
            estimated_time: planned * self.settings.estimated_secs_per_step,
        })
    }

    /// Current snapshot.
    ///
    /// # Errors
    /// [`DiscoveryError::NotFound`] for an unknown id.
    pub async fn get(&self, id: &str) -> Result<DiscoverySession, DiscoveryError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<DiscoverySession>, DiscoveryError> {
        self.store.list().await
    }

    /// Pauses a running session; a paused one stays paused.
    ///
    /// # Errors
    /// `NotFound`, or `InvalidTransition` for starting and terminal sessions.
    pub async fn pause(&self, id: &str) -> Result<DiscoveryStatus, DiscoveryError> {
        let s = self.store.update(id, Box::new(|s| s.pause())).await?;
        info!(discovery_id = %id, status = %s.status, "pause requested");
        Ok(s.status)
    }

    /// Resumes a paused session; a running one stays running.
    ///
    /// # Errors
    /// `NotFound`, or `InvalidTransition` for terminal sessions.
    pub async fn resume(&self, id: &str) -> Result<DiscoveryStatus, DiscoveryError> {
        let s = self.store.update(id, Box::new(|s| s.resume())).await?;
        info!(discovery_id = %id, status = %s.status, "resume requested");
        Ok(s.status)
    }
}
