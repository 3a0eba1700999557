//! Startup configuration: providers to launch and model settings.
//!
//! Read from a JSON file exactly once at startup; the session never watches
//! or re-reads it. Providers are listed as an array so they connect in
//! declaration order.
//!
//! ```json
//! {
//!   "model": {"host": "http://127.0.0.1:11434", "name": "qwen3", "temperature": 0.7},
//!   "providers": [
//!     {"name": "files", "command": "uvx", "args": ["mcp-server-files"],
//!      "env": {"FILES_ROOT": "/data"}, "cwd": "/data"}
//!   ],
//!   "tool_timeout_ms": 30000,
//!   "max_tool_rounds": 8
//! }
//! ```

use crate::provider::ProviderSpec;
use serde::Deserialize;
use std::path::Path;

/// Model endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Chat endpoint host, e.g. `http://127.0.0.1:11434`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Model identifier as known to the server.
    pub name: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Response token cap forwarded to the server, when set.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_host() -> String {
    crate::DEFAULT_MODEL_HOST.to_string()
}

/// The full startup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
    /// Optional system prompt seeding every session.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_tool_timeout_ms() -> u64 {
    crate::DEFAULT_TOOL_TIMEOUT.as_millis() as u64
}

fn default_max_tool_rounds() -> u32 {
    8
}

fn default_max_result_bytes() -> usize {
    crate::tools::DEFAULT_MAX_RESULT_BYTES
}

impl AppConfig {
    /// Load and parse the configuration file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file '{}': {e}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse config file '{}': {e}", path.display()))
    }
}
