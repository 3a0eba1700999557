//! The model oracle seam.
//!
//! The session drives the conversation through this trait rather than a
//! concrete HTTP client, so tests can script the model's side of the
//! dialogue. Uses a boxed future so the trait stays dyn-compatible.

use crate::error::AgentError;
use crate::{ChatCompletion, LocalModelClient, Message, ToolDef};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ModelOracle::chat`].
pub type OracleFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatCompletion, AgentError>> + Send + 'a>>;

/// An opaque request/response oracle over the conversation transcript.
///
/// Implementations must keep [`AgentError::ModelConnectionRefused`]
/// distinguishable from other failures — the session's retry guidance
/// depends on it.
pub trait ModelOracle: Send + Sync {
    fn chat<'a>(&'a self, messages: &'a [Message], tools: &'a [ToolDef]) -> OracleFuture<'a>;
}

impl ModelOracle for LocalModelClient {
    fn chat<'a>(&'a self, messages: &'a [Message], tools: &'a [ToolDef]) -> OracleFuture<'a> {
        Box::pin(self.chat(messages, tools))
    }
}
