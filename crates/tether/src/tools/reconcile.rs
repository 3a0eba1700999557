//! Best-effort repair of misnamed tool-call arguments.
//!
//! Local models regularly invent near-miss argument names (`qry` for
//! `query`, `file_path` for `path`). Rather than burning a model round trip
//! on every such slip, the session renames arguments toward the declared
//! parameter names before executing. This is a heuristic, not a correctness
//! guarantee: a key with no plausible counterpart passes through unchanged
//! and the provider gets to reject it.

use super::schema::ToolSchema;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Propose renames for provided argument keys that don't match any declared
/// parameter name.
///
/// Both sides are normalized (lowercased, underscores and hyphens stripped);
/// a declared parameter matches when either normalized form contains the
/// other's characters in order, so abbreviations (`qry` → `query`) align as
/// well as decorated names (`search_query` → `query`). The first declared
/// match wins; keys with no match are omitted from the mapping. Pure and
/// side-effect-free.
pub fn suggest(schema: &ToolSchema, provided: &Map<String, Value>) -> BTreeMap<String, String> {
    let declared: Vec<&String> = schema.parameters.properties.keys().collect();
    let mut mapping = BTreeMap::new();

    for provided_key in provided.keys() {
        if schema.parameters.properties.contains_key(provided_key) {
            continue;
        }
        let normalized_provided = normalize_key(provided_key);
        if normalized_provided.is_empty() {
            continue;
        }
        let suggestion = declared.iter().find(|declared_key| {
            let normalized_declared = normalize_key(declared_key);
            keys_align(&normalized_provided, &normalized_declared)
        });
        if let Some(declared_key) = suggestion {
            mapping.insert(provided_key.clone(), (*declared_key).clone());
        }
    }
    mapping
}

/// Apply a rename mapping to an argument object. Mapped keys are renamed;
/// everything else passes through unchanged.
pub fn apply(
    arguments: Map<String, Value>,
    mapping: &BTreeMap<String, String>,
) -> Map<String, Value> {
    arguments
        .into_iter()
        .map(|(key, value)| match mapping.get(&key) {
            Some(renamed) => (renamed.clone(), value),
            None => (key, value),
        })
        .collect()
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether one normalized key's characters appear, in order, within the
/// other. Subsumes plain substring containment.
fn keys_align(a: &str, b: &str) -> bool {
    in_order_subset(a, b) || in_order_subset(b, a)
}

fn in_order_subset(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|n| chars.any(|h| h == n))
}
