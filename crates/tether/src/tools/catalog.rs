//! Catalog builder: one pass over the connected providers at session start.
//!
//! The catalog and its dispatch table are built exactly once and treated as
//! read-only for the rest of the session. Degradation is partial by design:
//! a provider returning a malformed tool list is skipped with a diagnostic
//! and the remaining providers still contribute.

use super::schema::ToolSchema;
use crate::ToolDef;
use crate::error::AgentError;
use crate::provider::ProviderHandle;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// The session-wide tool catalog plus the name→provider dispatch table.
pub struct ToolCatalog {
    schemas: Vec<ToolSchema>,
    /// Tool name → (provider index, schema index).
    dispatch: HashMap<String, (usize, usize)>,
}

impl ToolCatalog {
    /// Query every connected provider and build the catalog.
    ///
    /// Fails with [`AgentError::NoProvidersAvailable`] when the provider
    /// list is empty — a session without any usable connection cannot
    /// proceed, even though a connected provider offering zero tools can.
    /// On a tool-name collision the later provider's registration wins;
    /// the shadowing is logged but not an error.
    pub async fn build(providers: &[ProviderHandle]) -> Result<Self, AgentError> {
        if providers.is_empty() {
            return Err(AgentError::NoProvidersAvailable);
        }

        let mut schemas: Vec<ToolSchema> = Vec::new();
        let mut dispatch: HashMap<String, (usize, usize)> = HashMap::new();

        for (provider_idx, provider) in providers.iter().enumerate() {
            let raw = match provider.client.list_tools().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("provider '{}' failed to list tools: {e}; skipping", provider.name);
                    continue;
                }
            };
            let Value::Array(entries) = raw else {
                warn!(
                    "provider '{}' returned a malformed tool list (not an array); skipping",
                    provider.name,
                );
                continue;
            };

            for entry in &entries {
                let Some(schema) = ToolSchema::from_raw(entry) else {
                    continue;
                };
                if let Some((shadowed_idx, _)) = dispatch.get(&schema.name) {
                    warn!(
                        "tool '{}' from provider '{}' shadows the registration from provider '{}'",
                        schema.name, provider.name, providers[*shadowed_idx].name,
                    );
                }
                let schema_idx = schemas.len();
                dispatch.insert(schema.name.clone(), (provider_idx, schema_idx));
                schemas.push(schema);
            }
            debug!(
                "provider '{}' contributed {} tool(s)",
                provider.name,
                entries.len(),
            );
        }

        debug!("catalog built: {} tool(s) across {} provider(s)", dispatch.len(), providers.len());
        Ok(Self { schemas, dispatch })
    }

    /// The schema registered under `name`, if any.
    pub fn schema(&self, name: &str) -> Option<&ToolSchema> {
        self.dispatch
            .get(name)
            .map(|(_, schema_idx)| &self.schemas[*schema_idx])
    }

    /// The index of the provider that owns `name`.
    pub fn provider_index(&self, name: &str) -> Option<usize> {
        self.dispatch.get(name).map(|(provider_idx, _)| *provider_idx)
    }

    /// Model-facing definitions for every registered tool, in a stable
    /// (name-sorted) order.
    pub fn defs(&self) -> Vec<ToolDef> {
        let mut names: Vec<&String> = self.dispatch.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.schema(name))
            .map(ToolSchema::to_def)
            .collect()
    }

    /// Number of registered tools (shadowed registrations excluded).
    pub fn len(&self) -> usize {
        self.dispatch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatch.is_empty()
    }
}
