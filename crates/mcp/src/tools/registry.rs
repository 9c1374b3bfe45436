// MCP tool registry and JSON schema helpers

use crate::error::ToolError;
use crate::protocol::ToolSchema;
use serde_json::Value;
use std::sync::Arc;

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with arguments already validated against `schema()`.
    ///
    /// Returns the tool output shaped exactly as the declared output schema.
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;
}

struct RegisteredTool {
    schema: ToolSchema,
    tool: Arc<dyn Tool>,
}

/// Fixed, ordered set of tools offered by the server.
///
/// Built once at startup; there is no way to register or remove tools
/// afterwards. Schemas are captured at construction so `list` is constant.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Build a registry from tools in listing order.
    ///
    /// When two tools share a name, the first one wins.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut registered: Vec<RegisteredTool> = Vec::with_capacity(tools.len());
        for tool in tools {
            let schema = tool.schema();
            if registered.iter().any(|r| r.schema.name == schema.name) {
                tracing::warn!("Ignoring duplicate tool registration: {}", schema.name);
                continue;
            }
            registered.push(RegisteredTool { schema, tool });
        }
        Self { tools: registered }
    }

    /// All tool schemas, in registration order
    pub fn list(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|r| r.schema.clone()).collect()
    }

    /// Schema of a tool by name
    pub fn describe(&self, name: &str) -> Option<&ToolSchema> {
        self.tools
            .iter()
            .find(|r| r.schema.name == name)
            .map(|r| &r.schema)
    }

    /// Resolve a tool for dispatch
    pub fn lookup(&self, name: &str) -> Result<(&ToolSchema, Arc<dyn Tool>), ToolError> {
        self.tools
            .iter()
            .find(|r| r.schema.name == name)
            .map(|r| (&r.schema, r.tool.clone()))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|r| r.schema.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Check arguments against a tool's input schema.
///
/// Covers what the connector schemas use: an object with `required`
/// properties, each property typed with a JSON Schema primitive type.
/// Undeclared properties are ignored.
pub fn validate_arguments(schema: &ToolSchema, arguments: &Value) -> Result<(), ToolError> {
    let args = arguments
        .as_object()
        .ok_or_else(|| ToolError::invalid_input("arguments", "expected a JSON object"))?;

    if let Some(required) = schema.input_schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match args.get(field) {
                None | Some(Value::Null) => {
                    return Err(ToolError::invalid_input(field, "missing required field"));
                }
                Some(_) => {}
            }
        }
    }

    if let Some(properties) = schema.input_schema.get("properties").and_then(Value::as_object) {
        for (field, property) in properties {
            let Some(value) = args.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(expected) = property.get("type").and_then(Value::as_str) {
                if !json_type_matches(expected, value) {
                    return Err(ToolError::invalid_input(
                        field.as_str(),
                        format!("expected {}, got {}", expected, json_type_name(value)),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}
