//! # Gateway Core
//!
//! Canonical, vendor-neutral model for the LLM gateway.
//!
//! This crate provides the types shared by every other crate:
//! - Generation requests, responses and token usage
//! - Tool specifications, tool calls and tool results
//! - Stream chunks and merged stream events
//! - The provider adapter contract and adapter configuration
//! - The error taxonomy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;
pub mod tool;
pub mod types;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult, ProtocolFault};
pub use provider::{
    ChunkStream, ModelInfo, ProviderAdapter, ProviderAdapterConfig, ProviderKind, ProxyConfig,
    ProxyKind,
};
pub use request::{
    GenerationRequest, GenerationRequestBuilder, Message, MessageRole, Parameters,
    RequestMetadata,
};
pub use response::{FinishReason, GenerationResponse, ResponseStatus, TokenUsage};
pub use streaming::{Completion, StreamChunk, StreamEvent, StreamFailure};
pub use tool::{parse_arguments, ToolCallRequest, ToolCallResult, ToolChoice, ToolSpecification};
pub use types::{CorrelationId, MaxTokens, Temperature, TopP};
