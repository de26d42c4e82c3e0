//! Session storage behind one trait, with an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{error::DiscoveryError, model::DiscoverySession};

/// Mutation applied atomically to one stored session.
pub type SessionUpdate =
    Box<dyn FnOnce(&mut DiscoverySession) -> Result<(), DiscoveryError> + Send>;

/// Storage for discovery sessions.
///
/// Implementations must be thread-safe; `update` must apply the closure
/// atomically with respect to other updates of the same session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a new session, replacing any session with the same id.
    async fn insert(&self, session: DiscoverySession) -> Result<(), DiscoveryError>;

    /// Snapshot of one session.
    async fn get(&self, id: &str) -> Result<Option<DiscoverySession>, DiscoveryError>;

    /// Applies `f` and returns the resulting snapshot. When `f` fails the
    /// session is left unchanged.
    async fn update(&self, id: &str, f: SessionUpdate) -> Result<DiscoverySession, DiscoveryError>;

    /// All sessions, newest first.
    async fn list(&self) -> Result<Vec<DiscoverySession>, DiscoveryError>;
}

/// In-memory store guarded by an async `RwLock`. Data is lost when the
/// process exits.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, DiscoverySession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: DiscoverySession) -> Result<(), DiscoveryError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DiscoverySession>, DiscoveryError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, f: SessionUpdate) -> Result<DiscoverySession, DiscoveryError> {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get_mut(id)
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))?;
        let mut draft = current.clone();
        f(&mut draft)?;
        *current = draft.clone();
        Ok(draft)
    }

    async fn list(&self) -> Result<Vec<DiscoverySession>, DiscoveryError> {
        let mut all: Vec<DiscoverySession> =
            self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
