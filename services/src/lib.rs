//! Shared helpers: short identifiers and the sandboxed code runner.

pub mod ids;
pub mod sandbox;

pub use ids::short_id;
pub use sandbox::{
    CodeSandbox, ExecutionRecord, ExecutionRequest, ExecutionStatus, SandboxError,
};
