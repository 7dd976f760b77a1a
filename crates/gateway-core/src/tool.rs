//! Canonical tool-calling types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpecification {
    /// Tool name
    pub name: String,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments, passed through untouched
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolSpecification {
    /// Create a tool with an empty object schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: empty_object_schema(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the parameter schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// How the model should pick tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "name")]
pub enum ToolChoice {
    /// Model decides
    Auto,
    /// Never call tools
    None,
    /// Must call some tool
    Required,
    /// Must call the named tool
    Tool(String),
}

/// A tool call emitted by the model.
///
/// Arguments stay as raw JSON text. [`ToolCallRequest::parsed_arguments`]
/// never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Vendor or gateway assigned call id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

impl ToolCallRequest {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Create a tool call from already-structured arguments
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self::new(id, name, arguments.to_string())
    }

    /// Parse the arguments.
    ///
    /// Blank text yields `{}`; text that is not valid JSON yields
    /// `{"raw": <original text>}`.
    #[must_use]
    pub fn parsed_arguments(&self) -> Value {
        parse_arguments(&self.arguments)
    }
}

/// Parse tool argument text with the `{"raw": ...}` fallback.
#[must_use]
pub fn parse_arguments(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::json!({ "raw": text }))
}

/// Result of running a tool, sent back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Id of the call this answers
    pub call_id: String,
    /// Tool name
    pub name: String,
    /// Result text
    pub content: String,
}

impl ToolCallResult {
    /// Create a tool result
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }
}
