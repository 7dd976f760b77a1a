//! Streaming types: vendor-level chunks and the merged event sequence.

use crate::error::GatewayError;
use crate::response::{FinishReason, TokenUsage};
use crate::tool::ToolCallRequest;
use serde::{Deserialize, Serialize};

/// One decoded piece of a vendor stream, produced by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text delta
    pub delta: Option<String>,
    /// Fully assembled tool calls
    pub tool_calls: Vec<ToolCallRequest>,
    /// Finish reason, on the final chunk
    pub finish_reason: Option<FinishReason>,
    /// Usage, when the vendor reports it
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Text delta chunk
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Self::default()
        }
    }

    /// Final chunk
    #[must_use]
    pub fn finish(reason: FinishReason, usage: Option<TokenUsage>) -> Self {
        Self {
            finish_reason: Some(reason),
            usage,
            ..Self::default()
        }
    }

    /// Attach assembled tool calls
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Whether the chunk carries nothing useful
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delta.as_deref().map_or(true, str::is_empty)
            && self.tool_calls.is_empty()
            && self.finish_reason.is_none()
            && self.usage.is_none()
    }
}

/// Summary delivered with the terminal `Complete` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Full text, concatenated from the deltas
    pub content: String,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Token usage, zero-filled when unknown
    pub usage: TokenUsage,
    /// Tool calls assembled from the stream
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Display-safe description of a failed stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    /// Error type tag
    #[serde(rename = "type")]
    pub error_type: String,
    /// Message safe to show to end users
    pub message: String,
}

impl From<&GatewayError> for StreamFailure {
    fn from(error: &GatewayError) -> Self {
        Self {
            error_type: error.type_tag().to_string(),
            message: error.user_message(),
        }
    }
}

/// Event on a merged gateway stream.
///
/// A stream carries any number of `ContentDelta` and `Heartbeat` events and
/// then exactly one of `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text
    ContentDelta(String),
    /// Keep-alive
    Heartbeat,
    /// Successful end of stream
    Complete(Completion),
    /// Failed end of stream
    Error(StreamFailure),
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }

    /// Text of a content delta
    #[must_use]
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            Self::ContentDelta(text) => Some(text),
            _ => None,
        }
    }
}
