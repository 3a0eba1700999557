//! Error taxonomy for the session loop.
//!
//! The variants mirror how failures propagate: `NoProvidersAvailable` is
//! fatal at startup, the `Tool*` variants are local to a single call and
//! never abort a batch, and the `Model*` variants end the current turn —
//! with a refused connection kept distinguishable so the caller can print
//! retry guidance instead of a bare failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Zero tool providers could be connected at startup. Fatal: a session
    /// without any usable provider connection indicates a broken
    /// environment, even when a connected provider would have offered no
    /// tools.
    #[error("no tool providers could be connected")]
    NoProvidersAvailable,

    /// The requested tool name is absent from the dispatch table.
    #[error("unknown tool '{0}'")]
    ToolNotFound(String),

    /// The provider call lost the race against the per-call timer.
    #[error("tool '{name}' timed out after {timeout_ms} ms")]
    ToolTimeout { name: String, timeout_ms: u64 },

    /// The provider call itself failed. Provider-specific error shapes are
    /// normalized into this message; callers never see them.
    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    /// The model endpoint refused the connection. Turn-fatal but
    /// session-survivable.
    #[error("model connection refused at {0}")]
    ModelConnectionRefused(String),

    /// Any other model request failure. The turn's transcript is rolled
    /// back before this surfaces.
    #[error("model request failed: {0}")]
    ModelRequestFailed(String),
}
