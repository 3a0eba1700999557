//! Local-model agent REPL with subprocess tool providers.
//!
//! `tether` connects a local chat-completions endpoint (an Ollama-compatible
//! server) to a set of external tool providers — subprocesses that expose
//! named, schema-described capabilities over line-delimited JSON-RPC. The
//! core abstraction is the [`Session`](agent::session::Session): a
//! conversation loop that sends the transcript plus the tool catalog to the
//! model, executes any tool calls the model requests, repairs misnamed
//! arguments, and recovers inline when a tool call fails — without looping
//! forever on a call the model refuses to change.
//!
//! # Getting started
//!
//! ```ignore
//! use tether::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgentError> {
//!     let providers = vec![/* StdioProvider::launch(..) per configured provider */];
//!     let catalog = ToolCatalog::build(&providers).await?;
//!     let executor = ToolExecutor::new(providers, catalog, SessionConfig::default());
//!
//!     let client = LocalModelClient::new("http://127.0.0.1:11434", "qwen3");
//!     let mut session = Session::new(&client, executor, SessionConfig::default());
//!     session.run(|| read_next_line()).await
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Conversation loop and recovery protocol:** [`agent::session::Session`].
//! - **Tool catalog and dispatch:** [`tools::catalog::ToolCatalog`].
//! - **Tool execution (timeouts, flattening):** [`tools::executor::ToolExecutor`].
//! - **Argument-name repair:** [`tools::reconcile`].
//! - **Provider transport:** [`provider::StdioProvider`] behind the
//!   [`provider::ToolProvider`] trait.
//! - **Observing the loop:** [`agent::events::EventHandler`].

pub mod agent;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod ui;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::AgentError;

// ── Constants ──────────────────────────────────────────────────────

/// Default host for the local chat-completions endpoint.
pub const DEFAULT_MODEL_HOST: &str = "http://127.0.0.1:11434";

/// Default per-call tool timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_millis(30_000);

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// One turn in the conversation.
///
/// The transcript is an append-only sequence of these. Tool-role messages
/// carry the invoked tool's name in `tool_call_id`, linking the result back
/// to the assistant tool-call request that produced it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_name.into()),
        }
    }
}

// ── Tool call types ────────────────────────────────────────────────

/// A model-issued request to invoke a tool.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: ToolArguments,
}

/// Arguments attached to a tool call: either a raw string still requiring a
/// JSON decode, or an already-structured object. Local model servers differ
/// on which of the two they emit.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum ToolArguments {
    Text(String),
    Map(Map<String, Value>),
}

impl ToolArguments {
    /// Normalize into a key→value object.
    ///
    /// Raw strings are JSON-decoded; a decode failure (or a decode that does
    /// not yield an object) degrades to the one-key fallback
    /// `{"value": <original string>}` instead of failing the call — the tool
    /// provider is left to reject nonsensical input itself.
    pub fn normalize(&self) -> Map<String, Value> {
        match self {
            ToolArguments::Map(map) => map.clone(),
            ToolArguments::Text(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    let mut fallback = Map::new();
                    fallback.insert("value".to_string(), Value::String(raw.clone()));
                    fallback
                }
            },
        }
    }

    /// Canonical JSON rendering of the normalized arguments. Object keys are
    /// emitted in sorted order, so two payloads that decode to the same
    /// mapping compare byte-equal regardless of formatting.
    pub fn canonical(&self) -> String {
        Value::Object(self.normalize()).to_string()
    }
}

// ── Tool definitions (model-facing) ────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the model (function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ── Request / response types ───────────────────────────────────────

/// Sampling parameters forwarded to the model server. Unset fields are
/// omitted from serialization and the server's defaults apply.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Chat request body for an Ollama-compatible `/api/chat` endpoint.
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ModelOptions>,
}

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    message: Option<RawResponseMessage>,
    error: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

/// Clean return type from [`LocalModelClient::chat()`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for a local Ollama-compatible chat endpoint.
pub struct LocalModelClient {
    client: reqwest::Client,
    host: String,
    model: String,
    options: Option<ModelOptions>,
}

impl LocalModelClient {
    /// Create a client for the given host (e.g. `http://127.0.0.1:11434`)
    /// and model name.
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options: None,
        }
    }

    /// Attach sampling parameters forwarded on every request.
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// The configured host URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send the transcript plus tool definitions and return the model's next
    /// message. A refused connection is reported as
    /// [`AgentError::ModelConnectionRefused`], distinct from every other
    /// request failure.
    pub async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<ChatCompletion, AgentError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: false,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            options: self.options.clone(),
        };

        debug!(
            "model request: model={}, messages={}, tools={}",
            body.model,
            body.messages.len(),
            tools.len(),
        );
        trace!(
            "request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let url = format!("{}/api/chat", self.host);
        let start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AgentError::ModelConnectionRefused(self.host.clone())
                } else {
                    AgentError::ModelRequestFailed(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::ModelRequestFailed(format!("failed to read response: {e}")))?;

        debug!(
            "model response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len(),
        );

        if !status.is_success() {
            return Err(AgentError::ModelRequestFailed(format!(
                "model API HTTP {status}: {text}"
            )));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| AgentError::ModelRequestFailed(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(AgentError::ModelRequestFailed(format!(
                "model API error: {err}"
            )));
        }

        debug!(
            "token usage: prompt={}, completion={}",
            parsed.prompt_eval_count.unwrap_or(0),
            parsed.eval_count.unwrap_or(0),
        );

        match parsed.message {
            Some(m) => {
                let tool_calls = m.tool_calls.unwrap_or_default();
                debug!(
                    "model output: {} chars text, {} tool call(s)",
                    m.content.as_ref().map_or(0, |s| s.len()),
                    tool_calls.len(),
                );
                Ok(ChatCompletion {
                    content: m.content.filter(|c| !c.is_empty()),
                    tool_calls,
                })
            }
            None => {
                debug!("model output: empty (no message)");
                Ok(ChatCompletion {
                    content: None,
                    tool_calls: vec![],
                })
            }
        }
    }
}
