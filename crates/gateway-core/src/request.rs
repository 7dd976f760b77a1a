//! Canonical generation request.

use crate::error::GatewayError;
use crate::tool::{ToolCallRequest, ToolCallResult, ToolChoice, ToolSpecification};
use crate::types::{CorrelationId, MaxTokens, Temperature, TopP};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A vendor-neutral generation request.
///
/// Built once through [`GenerationRequestBuilder`] and then only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    system_prompt: Option<String>,
    messages: Vec<Message>,
    parameters: Parameters,
    metadata: RequestMetadata,
}

impl GenerationRequest {
    /// Create a request builder
    #[must_use]
    pub fn builder() -> GenerationRequestBuilder {
        GenerationRequestBuilder::default()
    }

    /// System prompt, if any
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Ordered conversation
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Sampling and tool parameters
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Correlation and attribution metadata
    #[must_use]
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// All text the model will read: system prompt plus message contents.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = self.system_prompt.as_deref() {
            parts.push(system);
        }
        for message in &self.messages {
            if let Some(content) = message.content.as_deref() {
                parts.push(content);
            }
            if let Some(result) = &message.tool_result {
                parts.push(&result.content);
            }
        }
        parts.join("\n")
    }

    /// Validate ranges and tool references.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.messages.is_empty() {
            return Err(GatewayError::invalid_request("messages cannot be empty", None));
        }

        let params = &self.parameters;
        if let Some(t) = params.temperature {
            Temperature::new(t)?;
        }
        if let Some(p) = params.top_p {
            TopP::new(p)?;
        }
        if let Some(m) = params.max_output_tokens {
            MaxTokens::new(m)?;
        }
        if params.top_k == Some(0) {
            return Err(GatewayError::invalid_request(
                "top_k must be greater than zero",
                None,
            ));
        }

        if let Some(ToolChoice::Tool(name)) = &params.tool_choice {
            if !params.tools.iter().any(|t| &t.name == name) {
                return Err(GatewayError::tool_call(
                    format!("tool_choice names undeclared tool '{name}'"),
                    Some(name.clone()),
                ));
            }
        }

        for message in &self.messages {
            if message.role == MessageRole::Tool && message.tool_result.is_none() {
                return Err(GatewayError::tool_call(
                    "tool message without a tool result",
                    None,
                ));
            }
        }

        Ok(())
    }
}

/// Builder for [`GenerationRequest`]
#[derive(Debug, Default)]
pub struct GenerationRequestBuilder {
    system_prompt: Option<String>,
    messages: Vec<Message>,
    parameters: Parameters,
    metadata: RequestMetadata,
}

impl GenerationRequestBuilder {
    /// Set the system prompt
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Append a message
    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace all messages
    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.parameters.temperature = Some(temperature);
        self
    }

    /// Set top_p
    #[must_use]
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.parameters.top_p = Some(top_p);
        self
    }

    /// Set top_k
    #[must_use]
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.parameters.top_k = Some(top_k);
        self
    }

    /// Set the output token limit
    #[must_use]
    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.parameters.max_output_tokens = Some(max);
        self
    }

    /// Set stop sequences
    #[must_use]
    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.parameters.stop = stop;
        self
    }

    /// Declare a tool
    #[must_use]
    pub fn tool(mut self, tool: ToolSpecification) -> Self {
        self.parameters.tools.push(tool);
        self
    }

    /// Replace the declared tools
    #[must_use]
    pub fn tools(mut self, tools: Vec<ToolSpecification>) -> Self {
        self.parameters.tools = tools;
        self
    }

    /// Set the tool-choice policy
    #[must_use]
    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.parameters.tool_choice = Some(choice);
        self
    }

    /// Add a provider-specific option, passed through to the vendor
    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.provider_options.insert(key.into(), value);
        self
    }

    /// Set the correlation id
    #[must_use]
    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.metadata.correlation_id = id;
        self
    }

    /// Set the session id
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.session_id = Some(id.into());
        self
    }

    /// Set the user id
    #[must_use]
    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.user_id = Some(id.into());
        self
    }

    /// Set the business feature tag
    #[must_use]
    pub fn business_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.business_tag = Some(tag.into());
        self
    }

    /// Build and validate the request
    pub fn build(self) -> Result<GenerationRequest, GatewayError> {
        let request = GenerationRequest {
            system_prompt: self.system_prompt,
            messages: self.messages,
            parameters: self.parameters,
            metadata: self.metadata,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Sampling, tool and vendor-specific parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Output token limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Declared tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpecification>,
    /// Tool-choice policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Opaque vendor options
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_options: Map<String, Value>,
}

/// Request metadata for correlation and attribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Correlation id
    #[serde(default)]
    pub correlation_id: CorrelationId,
    /// Session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// User id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Business feature tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_tag: Option<String>,
}

/// A conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author role
    pub role: MessageRole,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls made by an assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Tool output carried by a tool-role message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolCallResult>,
}

impl Message {
    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Create an assistant message that requested tool calls
    #[must_use]
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls,
            tool_result: None,
        }
    }

    /// Create a tool result message
    #[must_use]
    pub fn tool(result: ToolCallResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: None,
            tool_calls: Vec::new(),
            tool_result: Some(result),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// Tool response message
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}
