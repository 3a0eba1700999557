//! Events and handlers for the [`Session`](super::session::Session) loop.
//!
//! The session communicates with its caller through [`SessionEvent`]
//! variants — answers, tool activity, recovery notices. Callers implement
//! [`EventHandler`] to render, log, or record them; the session itself never
//! touches stdout.

use tracing::{info, warn};

/// Events emitted by the session during a turn.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    /// The final natural-language answer for the current turn.
    Answer(&'a str),
    /// A tool is about to be executed with the given (normalized) arguments.
    ToolExecuting { name: &'a str, arguments: &'a str },
    /// A tool finished executing and its result entered the transcript.
    ToolResult { name: &'a str, result: &'a str },
    /// A tool call failed hard and was skipped; the batch continues.
    ToolSkipped { name: &'a str, error: &'a str },
    /// A tool result signalled an application-level error; the session is
    /// explaining it back to the model for another attempt.
    Recovery { name: &'a str },
    /// The model repeated the identical failing call; the session stopped
    /// retrying instead of looping.
    NoProgress { name: &'a str },
    /// The per-turn tool round bound was hit.
    RoundLimitReached { max_rounds: u32 },
    /// The turn ended abnormally; the session keeps running.
    TurnAborted { reason: &'a str },
}

/// Handler for session events.
///
/// All events are informational; the default implementation ignores them.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &SessionEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler that logs through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &SessionEvent<'_>) {
        match event {
            SessionEvent::Answer(text) => info!("answer: {} chars", text.len()),
            SessionEvent::ToolExecuting { name, arguments } => {
                info!("executing {name}({arguments})");
            }
            SessionEvent::ToolResult { name, result } => {
                info!("tool {name} returned {} bytes", result.len());
            }
            SessionEvent::ToolSkipped { name, error } => {
                warn!("tool {name} skipped: {error}");
            }
            SessionEvent::Recovery { name } => info!("recovering failed call to {name}"),
            SessionEvent::NoProgress { name } => {
                warn!("no progress on {name}; abandoning the batch");
            }
            SessionEvent::RoundLimitReached { max_rounds } => {
                warn!("tool round limit ({max_rounds}) reached");
            }
            SessionEvent::TurnAborted { reason } => warn!("turn aborted: {reason}"),
        }
    }
}
