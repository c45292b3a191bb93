//! Tool catalog
//!
//! The catalog is static configuration: a list of tool definitions, either
//! the built-in set below or loaded from a JSON file at startup.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Map, Value};

use super::protocol::ToolDefinition;
use crate::error::{GatewayError, Result};

/// Built-in tool definitions, used when no catalog file is configured
pub const DEFAULT_TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "ping",
        "Check that the API key is valid and the downstream API is reachable",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "getUserInfo",
        "Return the account the API key belongs to",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "getProduct",
        "Retrieve a product by its ID",
        r#"{
            "type": "object",
            "properties": {
                "product_id": {"type": "integer", "description": "Product ID"}
            },
            "required": ["product_id"]
        }"#,
    ),
];

/// Get the built-in tool definitions as ToolDefinition structs
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    DEFAULT_TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

/// Immutable set of tools exposed by every session
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolCatalog {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        let tools = definitions
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();
        Self { tools }
    }

    /// Catalog with the built-in definitions
    pub fn builtin() -> Self {
        Self::new(get_tool_definitions())
    }

    /// Load a catalog from a JSON file holding an array of tool definitions
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let definitions: Vec<ToolDefinition> = serde_json::from_str(&content)?;
        if definitions.is_empty() {
            return Err(GatewayError::Config(format!(
                "tool catalog {} contains no tools",
                path.display()
            )));
        }
        tracing::info!(path = %path.display(), count = definitions.len(), "Loaded tool catalog");
        Ok(Self::new(definitions))
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Check `arguments` against the tool's input schema and return the
/// validated parameter bag.
///
/// Only `required` and primitive `type` declarations are enforced.
pub fn validate_arguments(tool: &ToolDefinition, arguments: Value) -> Result<Map<String, Value>> {
    let invalid = |detail: String| {
        GatewayError::InvalidInput(format!(
            "Invalid arguments for tool '{}': {}",
            tool.name, detail
        ))
    };

    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(invalid(format!("expected an object, got {}", type_name(&other)))),
    };

    let schema = &tool.input_schema;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| args.get(*name).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!("missing required {}", missing.join(", "))));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in &args {
            let expected = properties
                .get(name)
                .and_then(|prop| prop.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !value.is_null() && !matches_type(value, expected) {
                    return Err(invalid(format!(
                        "{} (invalid_type): expected {}, got {}",
                        name,
                        expected,
                        type_name(value)
                    )));
                }
            }
        }
    }

    Ok(args)
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
