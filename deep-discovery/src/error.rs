//! Typed error for discovery sessions.

use thiserror::Error;

use crate::model::DiscoveryStatus;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery '{0}' not found")]
    NotFound(String),

    #[error("discovery '{id}' cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: DiscoveryStatus,
        to: DiscoveryStatus,
    },

    #[error("invalid discovery request: {0}")]
    InvalidRequest(String),

    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("session store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),
}
