//! Tool providers: external processes exposing named capabilities.
//!
//! The [`ToolProvider`] trait is the narrow contract the engine consumes:
//! list the provider's tools, call one with structured arguments, close the
//! connection. The concrete [`StdioProvider`] speaks line-delimited JSON-RPC
//! to a spawned subprocess; everything above this seam is transport-agnostic
//! and tests substitute in-process fakes.
//!
//! Errors at this boundary are plain strings — the executor normalizes them
//! into the typed taxonomy before anything above sees them.

pub mod stdio;

pub use stdio::StdioProvider;

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Boxed future returned by [`ToolProvider`] methods.
///
/// Type alias to keep the trait dyn-compatible (object-safe).
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// A connected tool source.
///
/// `list_tools` returns the provider's raw tool descriptors — the catalog
/// builder, not the transport, decides whether the payload is well-formed.
pub trait ToolProvider: Send + Sync {
    /// Fetch the raw tool list. Expected to be a JSON array of descriptor
    /// objects; anything else is the catalog builder's problem.
    fn list_tools(&self) -> ProviderFuture<'_, Value>;

    /// Invoke a named tool with structured arguments and return the raw
    /// result payload.
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: &'a Map<String, Value>,
    ) -> ProviderFuture<'a, Value>;

    /// Release the connection. Called once during session teardown.
    fn close(&self) -> ProviderFuture<'_, ()>;
}

/// A named, connected provider as held by the executor.
pub struct ProviderHandle {
    pub name: String,
    pub client: Box<dyn ToolProvider>,
}

impl ProviderHandle {
    pub fn new(name: impl Into<String>, client: impl ToolProvider + 'static) -> Self {
        Self {
            name: name.into(),
            client: Box::new(client),
        }
    }
}

/// Launch descriptor for one provider, as read from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    /// Provider name — used in logs and the startup banner.
    pub name: String,
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory for the spawned process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}
