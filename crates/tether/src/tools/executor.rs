//! Tool execution: dispatch, timeout race, result flattening.
//!
//! The executor owns the provider connections and the catalog for the whole
//! session. Every call races the provider against a timer; whichever settles
//! first wins. Provider-side failures of any shape are normalized into
//! [`AgentError::ToolCallFailed`] so callers never see transport-specific
//! errors.

use super::catalog::ToolCatalog;
use super::schema::ToolSchema;
use crate::error::AgentError;
use crate::provider::ProviderHandle;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Maximum size (in bytes) for a flattened tool result before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Executes catalog tools against their owning providers.
pub struct ToolExecutor {
    providers: Vec<ProviderHandle>,
    catalog: ToolCatalog,
    default_timeout: Duration,
    max_result_bytes: usize,
}

impl ToolExecutor {
    pub fn new(providers: Vec<ProviderHandle>, catalog: ToolCatalog) -> Self {
        Self {
            providers,
            catalog,
            default_timeout: crate::DEFAULT_TOOL_TIMEOUT,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    /// Set the per-call timeout applied when a call doesn't override it.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the flattened-result size ceiling.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// The compiled catalog.
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// The schema registered for `name`, if any.
    pub fn schema(&self, name: &str) -> Option<&ToolSchema> {
        self.catalog.schema(name)
    }

    /// Invoke `name` with already-normalized arguments.
    ///
    /// The provider call and a timer run concurrently; timer expiry yields
    /// [`AgentError::ToolTimeout`]. On success the raw payload is flattened
    /// to text and truncated to the configured ceiling.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<String, AgentError> {
        let provider_idx = self
            .catalog
            .provider_index(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        let provider = &self.providers[provider_idx];
        let timeout = timeout.unwrap_or(self.default_timeout);

        debug!("tool call: {name} via provider '{}'", provider.name);
        let start = Instant::now();

        let payload =
            match tokio::time::timeout(timeout, provider.client.call_tool(name, arguments)).await {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => return Err(AgentError::ToolCallFailed(e)),
                Err(_) => {
                    warn!(
                        "tool {name} timed out after {:.1}s",
                        start.elapsed().as_secs_f64(),
                    );
                    return Err(AgentError::ToolTimeout {
                        name: name.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            };

        let flattened = flatten_content(payload);
        debug!(
            "tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            flattened.len(),
        );
        trace!(
            "tool {name} result preview: {}",
            &flattened[..flattened.len().min(300)]
        );

        Ok(truncate_result(flattened, self.max_result_bytes))
    }

    /// Close every provider connection. Called once during teardown; a
    /// provider that fails to close is logged, not propagated.
    pub async fn close_all(&self) {
        for provider in &self.providers {
            if let Err(e) = provider.client.close().await {
                warn!("failed to close provider '{}': {e}", provider.name);
            }
        }
    }
}

// ── Result flattening ─────────────────────────────────────────────

/// A content block within a tool result payload.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: Option<String> },
    #[serde(other)]
    Unsupported,
}

/// Flatten a raw result payload to a single string.
///
/// A sequence payload keeps only textual blocks, substituting the literal
/// `"No content"` for a textual block with no text, joined with newlines.
/// Anything else is stringified directly.
fn flatten_content(payload: Value) -> String {
    match payload {
        Value::Array(blocks) => blocks
            .into_iter()
            .filter_map(|block| match serde_json::from_value::<ContentBlock>(block) {
                Ok(ContentBlock::Text { text }) => {
                    Some(text.unwrap_or_else(|| "No content".to_string()))
                }
                Ok(ContentBlock::Unsupported) | Err(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Whether flattened result text signals an application-level failure.
///
/// A result that completed without throwing but whose content carries the
/// `"Error"` marker is a soft failure — the caller explains it back to the
/// model instead of appending it as a normal result.
pub fn is_error_text(text: &str) -> bool {
    text.contains("Error")
}

/// Truncate a result to `max_bytes`, appending a marker with the number of
/// elided bytes. Splits on a char boundary.
pub fn truncate_result(result: String, max_bytes: usize) -> String {
    if result.len() <= max_bytes {
        return result;
    }
    let mut end = max_bytes;
    while !result.is_char_boundary(end) {
        end -= 1;
    }
    let elided = result.len() - end;
    format!("{}\n[... output truncated: {elided} bytes elided]", &result[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderFuture, ToolProvider};
    use serde_json::json;

    /// Provider that answers `tools/list` with one tool and `tools/call`
    /// with a canned payload after an optional delay.
    struct CannedProvider {
        tool_name: &'static str,
        payload: Value,
        delay: Duration,
        fail_with: Option<&'static str>,
    }

    impl CannedProvider {
        fn new(tool_name: &'static str, payload: Value) -> Self {
            Self {
                tool_name,
                payload,
                delay: Duration::ZERO,
                fail_with: None,
            }
        }
    }

    impl ToolProvider for CannedProvider {
        fn list_tools(&self) -> ProviderFuture<'_, Value> {
            let name = self.tool_name;
            Box::pin(async move { Ok(json!([{"name": name}])) })
        }

        fn call_tool<'a>(
            &'a self,
            _name: &'a str,
            _arguments: &'a Map<String, Value>,
        ) -> ProviderFuture<'a, Value> {
            Box::pin(async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                match self.fail_with {
                    Some(msg) => Err(msg.to_string()),
                    None => Ok(self.payload.clone()),
                }
            })
        }

        fn close(&self) -> ProviderFuture<'_, ()> {
            Box::pin(async move { Ok(()) })
        }
    }

    async fn executor_for(provider: CannedProvider) -> ToolExecutor {
        let providers = vec![ProviderHandle::new("canned", provider)];
        let catalog = ToolCatalog::build(&providers).await.unwrap();
        ToolExecutor::new(providers, catalog)
    }

    #[tokio::test]
    async fn unknown_tool_is_tool_not_found() {
        let exec = executor_for(CannedProvider::new("echo", json!("ok"))).await;
        let err = exec.execute("missing", &Map::new(), None).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn slow_tool_loses_the_timeout_race() {
        let mut provider = CannedProvider::new("slow_tool", json!("done"));
        provider.delay = Duration::from_millis(500);
        let exec = executor_for(provider).await;

        let err = exec
            .execute("slow_tool", &Map::new(), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout { timeout_ms: 50, .. }));
    }

    #[tokio::test]
    async fn provider_throw_normalizes_to_tool_call_failed() {
        let mut provider = CannedProvider::new("echo", Value::Null);
        provider.fail_with = Some("backend exploded");
        let exec = executor_for(provider).await;

        let err = exec.execute("echo", &Map::new(), None).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolCallFailed(msg) if msg == "backend exploded"));
    }

    #[tokio::test]
    async fn sequence_payload_keeps_textual_blocks() {
        let payload = json!([
            {"type": "text", "text": "first"},
            {"type": "image", "data": "...ignored..."},
            {"type": "text"},
            {"type": "text", "text": "last"},
        ]);
        let exec = executor_for(CannedProvider::new("echo", payload)).await;
        let result = exec.execute("echo", &Map::new(), None).await.unwrap();
        assert_eq!(result, "first\nNo content\nlast");
    }

    #[tokio::test]
    async fn non_sequence_payload_is_stringified() {
        let exec = executor_for(CannedProvider::new("echo", json!({"count": 3}))).await;
        let result = exec.execute("echo", &Map::new(), None).await.unwrap();
        assert_eq!(result, r#"{"count":3}"#);
    }

    #[tokio::test]
    async fn long_results_are_truncated_with_marker() {
        let exec = executor_for(CannedProvider::new("echo", json!("x".repeat(200))))
            .await
            .with_max_result_bytes(100);
        let result = exec.execute("echo", &Map::new(), None).await.unwrap();
        assert!(result.len() < 200);
        assert!(result.contains("truncated"));
    }

    #[test]
    fn error_marker_classifies_soft_failures() {
        assert!(is_error_text("Error: file not found"));
        assert!(!is_error_text("3 files found"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let result = truncate_result("héllo wörld".repeat(20), 13);
        assert!(result.contains("bytes elided"));
    }
}
