//! Sandboxed code execution.
//!
//! Each submission is written to a fresh temporary directory and run with the
//! configured interpreter (`python3` by default) in that directory, with a
//! cleared environment and captured stdout/stderr. The child is killed when
//! the timeout elapses. Results are kept in an in-memory record store keyed
//! by `exec_<8 hex>` ids for the lifetime of the process.
//!
//! Network isolation is not enforced here; `allow_network` is only recorded.

use std::{collections::HashMap, path::Path, process::Stdio, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{process::Command, sync::RwLock, time::Duration};
use tracing::{debug, info, warn};

use crate::ids::short_id;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 120;

const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unsupported language '{0}' (only python is supported)")]
    UnsupportedLanguage(String),

    #[error("timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("code must not be empty")]
    EmptyCode,

    #[error("execution '{0}' not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_language() -> String {
    "python".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub allow_network: bool,
}

impl ExecutionRequest {
    pub fn python(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: default_language(),
            timeout: default_timeout(),
            allow_network: false,
        }
    }

    pub fn validate(&self) -> Result<(), SandboxError> {
        if !self.language.trim().eq_ignore_ascii_case("python") {
            return Err(SandboxError::UnsupportedLanguage(self.language.clone()));
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            return Err(SandboxError::InvalidTimeout(self.timeout));
        }
        if self.code.trim().is_empty() {
            return Err(SandboxError::EmptyCode);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Error,
    Timeout,
}

/// Snapshot of one execution, as returned by the polling endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    /// Seconds.
    pub execution_time: Option<f64>,
    pub exit_code: Option<i32>,
    pub language: String,
    pub timeout: u64,
    pub allow_network: bool,
    pub created_at: DateTime<Utc>,
}

/// Terminal result of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub exit_code: i32,
    pub execution_time: f64,
}

/// Runs submissions in the background and keeps their records.
///
/// Construct once, wrap in `Arc`, and share through application state.
pub struct CodeSandbox {
    interpreter: String,
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl CodeSandbox {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Interpreter from `SANDBOX_PYTHON`, default `python3`.
    pub fn from_env() -> Self {
        let interpreter = std::env::var("SANDBOX_PYTHON")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "python3".to_string());
        info!(%interpreter, "CodeSandbox initialized");
        Self::new(interpreter)
    }

    /// Validates the request, records it as `running` and spawns the run.
    ///
    /// # Errors
    /// Validation errors only; run failures land in the record.
    pub async fn submit(
        self: &Arc<Self>,
        req: ExecutionRequest,
    ) -> Result<ExecutionRecord, SandboxError> {
        req.validate()?;

        let id = short_id("exec");
        let record = ExecutionRecord {
            execution_id: id.clone(),
            status: ExecutionStatus::Running,
            output: None,
            error: None,
            execution_time: None,
            exit_code: None,
            language: req.language.clone(),
            timeout: req.timeout,
            allow_network: req.allow_network,
            created_at: Utc::now(),
        };
        self.records.write().await.insert(id.clone(), record.clone());
        info!(execution_id = %id, timeout_secs = req.timeout, "code execution submitted");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run(&id, &req.code, req.timeout).await;
            this.finish(&id, outcome).await;
        });

        Ok(record)
    }

    /// Current record for `id`.
    pub async fn get(&self, id: &str) -> Result<ExecutionRecord, SandboxError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(id.to_string()))
    }

    async fn finish(&self, id: &str, outcome: RunOutcome) {
        let mut records = self.records.write().await;
        if let Some(rec) = records.get_mut(id) {
            rec.status = outcome.status;
            rec.output = outcome.output;
            rec.error = outcome.error;
            rec.exit_code = Some(outcome.exit_code);
            rec.execution_time = Some(outcome.execution_time);
        }
    }

    /// Runs `code` to completion or timeout. Never fails; spawn and IO errors
    /// become an `error` outcome with exit code -1.
    pub async fn run(&self, id: &str, code: &str, timeout_secs: u64) -> RunOutcome {
        let started = Instant::now();
        let mut outcome = match self.run_in_tempdir(id, code, timeout_secs).await {
            Ok(o) => o,
            Err(e) => {
                warn!(execution_id = %id, error = %e, "code execution failed to start");
                RunOutcome {
                    status: ExecutionStatus::Error,
                    output: None,
                    error: Some(e.to_string()),
                    exit_code: -1,
                    execution_time: 0.0,
                }
            }
        };
        outcome.execution_time = started.elapsed().as_secs_f64();
        info!(
            execution_id = %id,
            status = ?outcome.status,
            exit_code = outcome.exit_code,
            elapsed_ms = started.elapsed().as_millis(),
            "code execution finished"
        );
        outcome
    }

    async fn run_in_tempdir(
        &self,
        id: &str,
        code: &str,
        timeout_secs: u64,
    ) -> Result<RunOutcome, SandboxError> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join(format!("code_{id}.py"));
        tokio::fs::write(&file, code).await?;

        let child = self.command(dir.path(), &file).spawn()?;
        debug!(execution_id = %id, dir = %dir.path().display(), "child spawned");

        // Dropping the future on timeout drops the child, and `kill_on_drop` kills it.
        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await
        {
            Ok(Ok(out)) => {
                let exit_code = out.status.code().unwrap_or(-1);
                let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                Ok(RunOutcome {
                    status: if out.status.success() {
                        ExecutionStatus::Completed
                    } else {
                        ExecutionStatus::Error
                    },
                    output: Some(String::from_utf8_lossy(&out.stdout).into_owned()),
                    error: (!stderr.is_empty()).then_some(stderr),
                    exit_code,
                    execution_time: 0.0,
                })
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(RunOutcome {
                status: ExecutionStatus::Timeout,
                output: None,
                error: Some(format!("Execution timed out after {timeout_secs} seconds")),
                exit_code: -1,
                execution_time: 0.0,
            }),
        }
    }

    fn command(&self, dir: &Path, file: &Path) -> Command {
        let path = std::env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string());
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(file)
            .current_dir(dir)
            .env_clear()
            .env("PATH", path)
            .env("PYTHONPATH", dir)
            .env("HOME", dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rules() {
        assert!(ExecutionRequest::python("print(1)").validate().is_ok());

        let mut req = ExecutionRequest::python("print(1)");
        req.language = "javascript".into();
        assert!(matches!(req.validate(), Err(SandboxError::UnsupportedLanguage(_))));

        let mut req = ExecutionRequest::python("print(1)");
        req.timeout = 0;
        assert!(matches!(req.validate(), Err(SandboxError::InvalidTimeout(0))));
        req.timeout = 121;
        assert!(matches!(req.validate(), Err(SandboxError::InvalidTimeout(121))));

        assert!(matches!(
            ExecutionRequest::python("  ").validate(),
            Err(SandboxError::EmptyCode)
        ));
    }

    #[test]
    fn request_defaults_from_json() {
        let req: ExecutionRequest = serde_json::from_str(r#"{"code":"print(1)"}"#).unwrap();
        assert_eq!(req.language, "python");
        assert_eq!(req.timeout, 30);
        assert!(!req.allow_network);
    }

    // `sh` stands in for the interpreter so the tests do not depend on python.
    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_codes() {
        let sandbox = CodeSandbox::new("sh");

        let ok = sandbox.run("t1", "echo hello", 5).await;
        assert_eq!(ok.status, ExecutionStatus::Completed);
        assert_eq!(ok.output.as_deref(), Some("hello\n"));
        assert_eq!(ok.exit_code, 0);
        assert!(ok.error.is_none());

        let bad = sandbox.run("t2", "echo oops >&2; exit 3", 5).await;
        assert_eq!(bad.status, ExecutionStatus::Error);
        assert_eq!(bad.exit_code, 3);
        assert_eq!(bad.error.as_deref(), Some("oops\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_a_clean_environment() {
        let sandbox = CodeSandbox::new("sh");
        let out = sandbox.run("t3", "echo \"$HOME|$SECRET_TOKEN\"", 5).await;
        let line = out.output.unwrap();
        let (home, secret) = line.trim_end().split_once('|').unwrap();
        assert!(!home.is_empty());
        assert!(secret.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_child() {
        let sandbox = CodeSandbox::new("sh");
        let out = sandbox.run("t4", "sleep 10", 1).await;
        assert_eq!(out.status, ExecutionStatus::Timeout);
        assert_eq!(out.exit_code, -1);
        assert!(out.execution_time < 5.0);
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error_record() {
        let sandbox = Arc::new(CodeSandbox::new("/nonexistent/interpreter"));
        let rec = sandbox.submit(ExecutionRequest::python("print(1)")).await.unwrap();
        assert_eq!(rec.status, ExecutionStatus::Running);
        assert!(rec.execution_id.starts_with("exec_"));

        let mut done = sandbox.get(&rec.execution_id).await.unwrap();
        for _ in 0..50 {
            if done.status != ExecutionStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            done = sandbox.get(&rec.execution_id).await.unwrap();
        }
        assert_eq!(done.status, ExecutionStatus::Error);
        assert_eq!(done.exit_code, Some(-1));
        assert!(done.execution_time.is_some());
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let sandbox = CodeSandbox::new("python3");
        assert!(matches!(
            sandbox.get("exec_missing").await,
            Err(SandboxError::NotFound(_))
        ));
    }
}
