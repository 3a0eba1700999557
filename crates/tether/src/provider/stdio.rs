//! Subprocess transport: line-delimited JSON-RPC over a child's stdio.
//!
//! One [`StdioProvider`] owns one child process. Requests are strictly
//! sequential — the session loop never has two calls in flight for the same
//! provider — so a single mutex over the stdio handles is enough. The child
//! is spawned with `kill_on_drop` so it dies on every exit path, including
//! panics; [`ToolProvider::close`] kills it explicitly during orderly
//! teardown.

use super::{ProviderFuture, ProviderSpec, ToolProvider};
use serde_json::{Map, Value, json};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

struct ProviderIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A tool provider reached over a spawned subprocess's stdin/stdout.
pub struct StdioProvider {
    name: String,
    io: tokio::sync::Mutex<ProviderIo>,
    next_id: AtomicU64,
}

impl StdioProvider {
    /// Spawn the configured command and perform the initialize handshake.
    pub async fn launch(spec: &ProviderSpec) -> Result<Self, String> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to launch provider '{}': {e}", spec.name))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| format!("provider '{}' has no stdin pipe", spec.name))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| format!("provider '{}' has no stdout pipe", spec.name))?;

        let provider = Self {
            name: spec.name.clone(),
            io: tokio::sync::Mutex::new(ProviderIo {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicU64::new(1),
        };

        provider
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "tether",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        provider.notify("notifications/initialized").await?;

        debug!("provider '{}' connected: {}", spec.name, spec.command);
        Ok(provider)
    }

    /// Send one request and block until the matching response line arrives.
    /// Notifications and unrelated lines in between are skipped.
    async fn request(&self, method: &str, params: Value) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();
        trace!("provider '{}' -> {line}", self.name);

        let mut io = self.io.lock().await;
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("provider '{}' write failed: {e}", self.name))?;
        io.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| format!("provider '{}' write failed: {e}", self.name))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| format!("provider '{}' flush failed: {e}", self.name))?;

        loop {
            let mut buf = String::new();
            let n = io
                .stdout
                .read_line(&mut buf)
                .await
                .map_err(|e| format!("provider '{}' read failed: {e}", self.name))?;
            if n == 0 {
                return Err(format!("provider '{}' closed its stdout", self.name));
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            let msg: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(_) => {
                    trace!("provider '{}' emitted a non-JSON line; skipping", self.name);
                    continue;
                }
            };
            if msg.get("id").and_then(Value::as_u64) != Some(id) {
                // Notification or a response to something else.
                continue;
            }
            if let Some(err) = msg.get("error") {
                let detail = err
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                return Err(detail);
            }
            return Ok(msg.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// Send a fire-and-forget notification.
    async fn notify(&self, method: &str) -> Result<(), String> {
        let line = json!({"jsonrpc": "2.0", "method": method}).to_string();
        let mut io = self.io.lock().await;
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("provider '{}' write failed: {e}", self.name))?;
        io.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| format!("provider '{}' write failed: {e}", self.name))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| format!("provider '{}' flush failed: {e}", self.name))
    }
}

impl ToolProvider for StdioProvider {
    fn list_tools(&self) -> ProviderFuture<'_, Value> {
        Box::pin(async move {
            let result = self.request("tools/list", json!({})).await?;
            // The wire result wraps the list; in-process fakes hand back the
            // array directly. Accept both.
            Ok(result.get("tools").cloned().unwrap_or(result))
        })
    }

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: &'a Map<String, Value>,
    ) -> ProviderFuture<'a, Value> {
        Box::pin(async move {
            let result = self
                .request(
                    "tools/call",
                    json!({"name": name, "arguments": Value::Object(arguments.clone())}),
                )
                .await?;
            Ok(result.get("content").cloned().unwrap_or(result))
        })
    }

    fn close(&self) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            let mut io = self.io.lock().await;
            if let Err(e) = io.child.kill().await {
                warn!("provider '{}' did not shut down cleanly: {e}", self.name);
            }
            Ok(())
        })
    }
}
