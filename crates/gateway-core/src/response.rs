//! Canonical generation response.

use crate::error::GatewayError;
use crate::tool::ToolCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Output token limit reached
    Length,
    /// Model requested tool calls
    ToolCalls,
    /// Content was filtered
    ContentFilter,
    /// Vendor reported an error
    Error,
    /// Not reported or not recognised
    #[default]
    Unknown,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Token usage. Zero-filled when the vendor does not report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create usage, deriving the total
    #[must_use]
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Usage with an explicit vendor total. A total below the sum is replaced
    /// by the sum.
    #[must_use]
    pub fn with_total(input_tokens: u32, output_tokens: u32, total_tokens: u32) -> Self {
        let sum = input_tokens.saturating_add(output_tokens);
        Self {
            input_tokens,
            output_tokens,
            total_tokens: total_tokens.max(sum),
        }
    }

    /// Whether nothing was counted
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0
    }

    /// Accumulate another usage record
    pub fn add(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Outcome status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Completed normally
    #[default]
    Success,
    /// Vendor returned an error payload
    Error,
}

/// A vendor-neutral generation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text
    pub content: String,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Token usage, always present
    pub usage: TokenUsage,
    /// Tool calls emitted by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Model that produced the response
    #[serde(default)]
    pub model: String,
    /// Opaque vendor metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
}

impl GenerationResponse {
    /// Successful response with text content
    #[must_use]
    pub fn success(content: impl Into<String>, finish_reason: FinishReason, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            finish_reason,
            usage,
            ..Self::default()
        }
    }

    /// Response reporting a vendor-side failure. Carries no tool calls.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: FinishReason::Error,
            status: ResponseStatus::Error,
            error_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Attach tool calls. Ignored on error responses.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        if self.status == ResponseStatus::Success {
            self.tool_calls = tool_calls;
        }
        self
    }

    /// Set the model id
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Outcome status
    #[must_use]
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Error reason for error responses
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        self.error_reason.as_deref()
    }

    /// Whether the response succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Whether the model produced neither text nor a tool call
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }

    /// Turn an error-status response into an error, pass successes through.
    ///
    /// The reason is free vendor text, so the error carries it as an
    /// invalid request and retry decisions fall to its message signature.
    pub fn into_result(self, provider: &str) -> Result<Self, GatewayError> {
        match self.status {
            ResponseStatus::Success => Ok(self),
            ResponseStatus::Error => {
                let reason = self.error_reason.as_deref().unwrap_or("no reason given");
                Err(GatewayError::invalid_request(
                    format!("{provider} reported an error: {reason}"),
                    None,
                ))
            }
        }
    }
}
