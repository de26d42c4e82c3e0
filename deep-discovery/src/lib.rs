//! Deep Discovery: multi-step research sessions over the knowledge base, the
//! web and the LLM.
//!
//! A session moves through five planned steps (query analysis, knowledge base
//! search, web intelligence, cross-reference analysis, report synthesis) on a
//! dedicated background task. Clients poll snapshots and may pause and resume
//! it; a paused runner parks between steps until resumed.
//!
//! Sessions live in a [`SessionStore`]; [`InMemorySessionStore`] is the
//! default.

mod engine;
mod error;
mod model;
mod prompts;
mod runner;
mod store;

pub use engine::{DiscoveryEngine, DiscoverySettings, DiscoveryStarted};
pub use error::DiscoveryError;
pub use model::{
    DiscoveryRequest, DiscoverySession, DiscoverySource, DiscoverySourceKind, DiscoveryStatus,
    DiscoveryStep, MAX_STEPS, STEP_NAMES, StepStatus,
};
pub use store::{InMemorySessionStore, SessionStore, SessionUpdate};
