//! Discovery session model and its state machine.

use std::fmt;

use ai_llm_service::ProviderPreference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Planned steps, in execution order.
pub const STEP_NAMES: [&str; 5] = [
    "Query Analysis & Planning",
    "Knowledge Base Search",
    "Web Intelligence Gathering",
    "Cross-Reference Analysis",
    "Synthesis & Report Generation",
];

pub const MAX_STEPS: usize = STEP_NAMES.len();

/// Session lifecycle.
///
/// `starting → running → {paused, completed, error}`, `paused → running`.
/// `completed` and `error` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStatus {
    Starting,
    Running,
    Paused,
    Completed,
    Error,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStatus::Starting => "starting",
            DiscoveryStatus::Running => "running",
            DiscoveryStatus::Paused => "paused",
            DiscoveryStatus::Completed => "completed",
            DiscoveryStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DiscoveryStatus::Completed | DiscoveryStatus::Error)
    }

    /// Whether the runner or a client may move a session from `self` to `next`.
    ///
    /// `paused → error` is allowed: the step in flight when a pause arrives
    /// may still fail.
    pub fn can_transition_to(&self, next: DiscoveryStatus) -> bool {
        use DiscoveryStatus::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Error)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Error)
                | (Paused, Running)
                | (Paused, Error)
        )
    }
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStep {
    /// 1-based.
    pub id: usize,
    pub name: String,
    pub status: StepStatus,
    /// 0–100.
    pub progress: f32,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySourceKind {
    Analysis,
    KnowledgeBase,
    WebSearch,
    Wikipedia,
    Report,
}

impl DiscoverySourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySourceKind::Analysis => "analysis",
            DiscoverySourceKind::KnowledgeBase => "knowledge_base",
            DiscoverySourceKind::WebSearch => "web_search",
            DiscoverySourceKind::Wikipedia => "wikipedia",
            DiscoverySourceKind::Report => "report",
        }
    }
}

/// Evidence accumulated by the steps. Ids are `src_<n>`, 1-based, in
/// insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySource {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: DiscoverySourceKind,
    pub relevance: f32,
    pub excerpt: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub timestamp: DateTime<Utc>,
}

fn default_max_steps() -> usize {
    MAX_STEPS
}

fn default_max_sources() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryRequest {
    pub query: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_true")]
    pub include_web_search: bool,
    #[serde(default = "default_true")]
    pub include_knowledge_base: bool,
    #[serde(default)]
    pub provider: Option<ProviderPreference>,
}

impl DiscoveryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_steps: default_max_steps(),
            max_sources: default_max_sources(),
            include_web_search: true,
            include_knowledge_base: true,
            provider: None,
        }
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.query.trim().is_empty() {
            return Err(DiscoveryError::InvalidRequest("query must not be empty".into()));
        }
        if !(1..=MAX_STEPS).contains(&self.max_steps) {
            return Err(DiscoveryError::InvalidRequest(format!(
                "max_steps must be between 1 and {MAX_STEPS}"
            )));
        }
        if self.max_sources == 0 {
            return Err(DiscoveryError::InvalidRequest("max_sources must be > 0".into()));
        }
        Ok(())
    }
}

/// One research session. The background runner is its only writer apart
/// from pause/resume, which touch `status` alone.
#[derive(Clone, Debug, Serialize)]
pub struct DiscoverySession {
    pub id: String,
    pub query: String,
    pub status: DiscoveryStatus,
    /// 0–100; finished steps over planned steps.
    pub progress: f32,
    /// 1-based; 0 before the first step starts.
    pub current_step: usize,
    pub steps: Vec<DiscoveryStep>,
    pub sources: Vec<DiscoverySource>,
    pub search_terms: Vec<String>,
    pub final_report: Option<String>,
    pub error: Option<String>,
    pub max_sources: usize,
    pub include_web_search: bool,
    pub include_knowledge_base: bool,
    #[serde(skip)]
    pub provider: Option<ProviderPreference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscoverySession {
    /// New session in `starting` with `max_steps` pending steps.
    pub fn new(id: impl Into<String>, req: &DiscoveryRequest) -> Self {
        let now = Utc::now();
        let steps = STEP_NAMES
            .iter()
            .take(req.max_steps.clamp(1, MAX_STEPS))
            .enumerate()
            .map(|(i, name)| DiscoveryStep {
                id: i + 1,
                name: (*name).to_string(),
                status: StepStatus::Pending,
                progress: 0.0,
                result: None,
                error: None,
            })
            .collect();
        Self {
            id: id.into(),
            query: req.query.trim().to_string(),
            status: DiscoveryStatus::Starting,
            progress: 0.0,
            current_step: 0,
            steps,
            sources: Vec::new(),
            search_terms: Vec::new(),
            final_report: None,
            error: None,
            max_sources: req.max_sources,
            include_web_search: req.include_web_search,
            include_knowledge_base: req.include_knowledge_base,
            provider: req.provider,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next` if the state machine allows it.
    pub fn transition(&mut self, next: DiscoveryStatus) -> Result<(), DiscoveryError> {
        if !self.status.can_transition_to(next) {
            return Err(DiscoveryError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Client pause. Pausing a paused session is a no-op.
    pub fn pause(&mut self) -> Result<(), DiscoveryError> {
        match self.status {
            DiscoveryStatus::Paused => Ok(()),
            _ => self.transition(DiscoveryStatus::Paused),
        }
    }

    /// Client resume. Resuming a running or starting session is a no-op.
    pub fn resume(&mut self) -> Result<(), DiscoveryError> {
        match self.status {
            DiscoveryStatus::Running | DiscoveryStatus::Starting => Ok(()),
            _ => self.transition(DiscoveryStatus::Running),
        }
    }

    /// Marks the session failed, recording `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DiscoveryError> {
        self.transition(DiscoveryStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Appends a source with the next `src_<n>` id. Returns `false` once
    /// `max_sources` is reached.
    pub fn push_source(&mut self, mut source: DiscoverySource) -> bool {
        if self.sources.len() >= self.max_sources {
            return false;
        }
        source.id = format!("src_{}", self.sources.len() + 1);
        self.sources.push(source);
        self.touch();
        true
    }

    /// Step at 0-based `idx`.
    pub fn step_mut(&mut self, idx: usize) -> Result<&mut DiscoveryStep, DiscoveryError> {
        let id = self.id.clone();
        self.steps
            .get_mut(idx)
            .ok_or_else(|| DiscoveryError::Store(format!("session '{id}' has no step {}", idx + 1)))
    }

    pub fn planned_steps(&self) -> usize {
        self.steps.len()
    }

    /// Finished steps over planned steps, as a percentage.
    pub fn recompute_progress(&mut self) {
        let finished = self
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
            .count();
        self.progress = if self.steps.is_empty() {
            0.0
        } else {
            finished as f32 / self.steps.len() as f32 * 100.0
        };
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
