//! Configuration for the [`Session`](super::session::Session).

use std::time::Duration;

/// Tunables for the session loop.
///
/// The tool-round bound caps how many times one user turn may cycle through
/// tool execution (including recovery rounds). The two heuristic stop
/// conditions — an identical repeated call, no new tool names — usually end
/// a turn well before the bound; the bound makes the worst case predictable.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-call tool timeout.
    pub tool_timeout: Duration,
    /// Maximum tool rounds within one user turn.
    pub max_tool_rounds: u32,
    /// Flattened tool result size ceiling in bytes.
    pub max_result_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tool_timeout: crate::DEFAULT_TOOL_TIMEOUT,
            max_tool_rounds: 8,
            max_result_bytes: crate::tools::DEFAULT_MAX_RESULT_BYTES,
        }
    }
}

impl SessionConfig {
    /// Set the per-call tool timeout.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the per-turn tool round bound.
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Set the tool result size ceiling.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}
