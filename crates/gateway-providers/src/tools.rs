//! Tool-call normalization between the canonical model and vendor shapes.
//!
//! Nothing in here fails on a malformed vendor payload: unparseable argument
//! text is carried verbatim and surfaces as `{"raw": ...}` when parsed.

use gateway_core::{ToolCallRequest, ToolChoice, ToolSpecification};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Generate a gateway call id for vendors that do not assign one
#[must_use]
pub fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// OpenAI-compatible shapes
// ---------------------------------------------------------------------------

/// OpenAI `tools[]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiTool {
    /// Always `"function"`
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function declaration
    pub function: OpenAiFunction,
}

/// OpenAI function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunction {
    /// Function name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema
    pub parameters: Value,
}

/// OpenAI tool call, as echoed in responses and sent back in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    /// Call id
    #[serde(default)]
    pub id: String,
    /// Always `"function"`
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    /// Function invocation
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// OpenAI function invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    /// Function name
    #[serde(default)]
    pub name: String,
    /// Raw JSON arguments
    #[serde(default)]
    pub arguments: String,
}

/// Canonical tools to OpenAI `tools[]`
#[must_use]
pub fn to_openai_tools(tools: &[ToolSpecification]) -> Vec<OpenAiTool> {
    tools
        .iter()
        .map(|t| OpenAiTool {
            tool_type: function_type(),
            function: OpenAiFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

/// Canonical tool choice to OpenAI `tool_choice`
#[must_use]
pub fn to_openai_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool(name) => json!({ "type": "function", "function": { "name": name } }),
    }
}

/// Canonical tool calls to OpenAI history entries
#[must_use]
pub fn to_openai_tool_calls(calls: &[ToolCallRequest]) -> Vec<OpenAiToolCall> {
    calls
        .iter()
        .map(|c| OpenAiToolCall {
            id: c.id.clone(),
            call_type: function_type(),
            function: OpenAiFunctionCall {
                name: c.name.clone(),
                arguments: c.arguments.clone(),
            },
        })
        .collect()
}

/// OpenAI echoed tool calls to canonical calls
#[must_use]
pub fn from_openai_tool_calls(calls: Vec<OpenAiToolCall>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .filter(|c| !c.function.name.is_empty())
        .map(|c| {
            let id = if c.id.is_empty() { generate_call_id() } else { c.id };
            ToolCallRequest::new(id, c.function.name, c.function.arguments)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Anthropic shapes
// ---------------------------------------------------------------------------

/// Anthropic `tools[]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    /// Tool name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema
    pub input_schema: Value,
}

/// Canonical tools to Anthropic `tools[]`
#[must_use]
pub fn to_anthropic_tools(tools: &[ToolSpecification]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|t| AnthropicTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect()
}

/// Canonical tool choice to Anthropic `tool_choice`
#[must_use]
pub fn to_anthropic_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({ "type": "auto" }),
        ToolChoice::None => json!({ "type": "none" }),
        ToolChoice::Required => json!({ "type": "any" }),
        ToolChoice::Tool(name) => json!({ "type": "tool", "name": name }),
    }
}

/// Anthropic `tool_use` block to a canonical call
#[must_use]
pub fn from_anthropic_tool_use(id: &str, name: &str, input: &Value) -> ToolCallRequest {
    let id = if id.is_empty() {
        generate_call_id()
    } else {
        id.to_string()
    };
    ToolCallRequest::from_value(id, name, input)
}

/// Canonical call arguments as an Anthropic `input` object
#[must_use]
pub fn anthropic_tool_input(call: &ToolCallRequest) -> Value {
    object_or_wrapped(call.parsed_arguments())
}

// ---------------------------------------------------------------------------
// Gemini shapes
// ---------------------------------------------------------------------------

/// Gemini function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    /// Function name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Canonical tools to Gemini `functionDeclarations`
#[must_use]
pub fn to_gemini_declarations(tools: &[ToolSpecification]) -> Vec<GeminiFunctionDeclaration> {
    tools
        .iter()
        .map(|t| GeminiFunctionDeclaration {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: Some(t.parameters.clone()),
        })
        .collect()
}

/// Canonical tool choice to Gemini `toolConfig`
#[must_use]
pub fn to_gemini_tool_config(choice: &ToolChoice) -> Value {
    let config = match choice {
        ToolChoice::Auto => json!({ "mode": "AUTO" }),
        ToolChoice::None => json!({ "mode": "NONE" }),
        ToolChoice::Required => json!({ "mode": "ANY" }),
        ToolChoice::Tool(name) => json!({ "mode": "ANY", "allowedFunctionNames": [name] }),
    };
    json!({ "functionCallingConfig": config })
}

/// Gemini `functionCall` part to a canonical call
#[must_use]
pub fn from_gemini_function_call(name: &str, args: &Value) -> ToolCallRequest {
    ToolCallRequest::from_value(generate_call_id(), name, args)
}

/// Canonical call arguments as a Gemini `args` object
#[must_use]
pub fn gemini_function_args(call: &ToolCallRequest) -> Value {
    object_or_wrapped(call.parsed_arguments())
}

/// Tool result text as a Gemini `functionResponse.response` object
#[must_use]
pub fn gemini_function_response(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "content": content }),
    }
}

fn object_or_wrapped(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => json!({ "value": other }),
    }
}

// ---------------------------------------------------------------------------
// Streaming assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collects streamed tool-call fragments into complete calls.
///
/// Fragments are keyed by the vendor's index (OpenAI `tool_calls[].index`,
/// Anthropic content block index). Tolerant of fragments arriving before the
/// call was started and of ids or names delivered late.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a call, or late-arriving id/name
    pub fn start(&mut self, index: usize, id: Option<&str>, name: Option<&str>) {
        let call = self.calls.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            call.name = name.to_string();
        }
    }

    /// Append an argument fragment
    pub fn append(&mut self, index: usize, fragment: &str) {
        self.calls
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    /// Whether any call was seen
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Finish assembly, in index order. Calls without a name are dropped.
    #[must_use]
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|c| {
                let id = if c.id.is_empty() { generate_call_id() } else { c.id };
                ToolCallRequest::new(id, c.name, c.arguments)
            })
            .collect()
    }
}
