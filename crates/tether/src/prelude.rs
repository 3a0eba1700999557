//! Convenience re-exports for common `tether` types.
//!
//! Meant to be glob-imported when embedding the session loop:
//!
//! ```ignore
//! use tether::prelude::*;
//! ```

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    ChatCompletion, LocalModelClient, Message, MessageRole, ModelOptions, ToolArguments, ToolCall,
    ToolDef,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    EventHandler, LoggingHandler, ModelOracle, NoopHandler, Session, SessionConfig, SessionEvent,
};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::AgentError;

// ── Tools and providers ─────────────────────────────────────────────
pub use crate::provider::{ProviderHandle, ProviderSpec, StdioProvider, ToolProvider};
pub use crate::tools::{ToolCatalog, ToolExecutor, ToolSchema};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{AppConfig, ModelConfig};
