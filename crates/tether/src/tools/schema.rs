//! Normalized tool schemas.
//!
//! Providers describe their tools in a JSON-Schema-ish shape; this module
//! parses those descriptors into closed types and serializes them back into
//! the function-calling definitions the model request expects.

use crate::ToolDef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Schema for a single parameter. Unknown descriptor fields are ignored on
/// parse; unset fields are omitted when serializing back out.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PropertySchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element schema for array parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// Nested shape for object parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertySchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// The parameter object of one tool: property map plus required set.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// The normalized description of one capability.
#[derive(Clone, Debug)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: ObjectSchema,
}

impl ToolSchema {
    /// Convert a raw provider descriptor into a schema.
    ///
    /// Returns `None` (with a diagnostic) for descriptors lacking a `name` —
    /// those are dropped from the catalog, not treated as fatal. The input
    /// schema is read from `inputSchema` with `parameters` as a fallback
    /// key; an absent or unparseable schema yields an empty parameter
    /// object.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let Some(name) = raw.get("name").and_then(Value::as_str) else {
            warn!("dropping tool descriptor without a name: {raw}");
            return None;
        };
        let description = raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parameters = raw
            .get("inputSchema")
            .or_else(|| raw.get("parameters"))
            .map(|schema| {
                serde_json::from_value(schema.clone()).unwrap_or_else(|e| {
                    warn!("tool '{name}' has an unparseable input schema: {e}");
                    ObjectSchema::default()
                })
            })
            .unwrap_or_default();
        Some(Self {
            name: name.to_string(),
            description,
            parameters,
        })
    }

    /// All declared parameter names, in the catalog's stable order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.properties.keys().map(String::as_str).collect()
    }

    /// Required parameter names.
    pub fn required_names(&self) -> &[String] {
        &self.parameters.required
    }

    /// The model-facing function-calling definition.
    pub fn to_def(&self) -> ToolDef {
        let parameters = serde_json::to_value(&self.parameters).unwrap_or_else(|e| {
            // Serializing plain maps and strings cannot realistically fail;
            // degrade to an empty object rather than poisoning the request.
            warn!("failed to serialize schema for '{}': {e}", self.name);
            serde_json::json!({"type": "object", "properties": {}})
        });
        ToolDef::new(&self.name, &self.description, parameters)
    }
}
