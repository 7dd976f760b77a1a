//! Error taxonomy shared by every layer of the gateway.
//!
//! Adapters translate vendor failures into [`GatewayError`] before they cross
//! the adapter boundary. Everything above the adapters (retry, streaming,
//! service) reasons only about these variants.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Known shapes of vendor protocol misbehaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFault {
    /// The call completed but the result structure was empty or absent.
    EmptyResult,
    /// The call completed with neither text nor a tool call.
    NoContent,
    /// The payload could not be decoded.
    Malformed,
}

impl std::fmt::Display for ProtocolFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResult => write!(f, "empty_result"),
            Self::NoContent => write!(f, "no_content"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Gateway error taxonomy.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Missing or rejected credentials, or an adapter that is not usable.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Diagnostic message
        message: String,
    },

    /// Socket, connect or upstream 5xx failure.
    #[error("Network error from {provider}: {message}")]
    TransientNetwork {
        /// Provider that failed
        provider: String,
        /// Diagnostic message
        message: String,
        /// HTTP status, when one was received
        status_code: Option<u16>,
    },

    /// The call exceeded its deadline.
    #[error("Request timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Vendor rate limit or quota signal.
    #[error("Rate limited by {provider}: {message}")]
    RateLimit {
        /// Provider that throttled the call
        provider: String,
        /// Diagnostic message
        message: String,
        /// Vendor suggested wait, if any
        retry_after: Option<Duration>,
    },

    /// Malformed, empty or ambiguous vendor payload.
    #[error("Protocol error from {provider} ({fault}): {message}")]
    VendorProtocol {
        /// Provider that produced the payload
        provider: String,
        /// Which quirk was observed
        fault: ProtocolFault,
        /// Diagnostic message
        message: String,
    },

    /// Invalid tool arguments or an unsupported tool.
    #[error("Tool call error: {message}")]
    ToolCall {
        /// Diagnostic message
        message: String,
        /// Tool involved, if known
        tool: Option<String>,
    },

    /// The request was rejected as invalid, locally or by the vendor.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Diagnostic message
        message: String,
        /// HTTP status, when the vendor rejected it
        status_code: Option<u16>,
    },

    /// The consumer cancelled the call.
    #[error("Request cancelled")]
    Cancelled,

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic message
        message: String,
    },
}

impl GatewayError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transient network error
    pub fn transient(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::TransientNetwork {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Create a rate limit error
    pub fn rate_limit(
        provider: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::RateLimit {
            provider: provider.into(),
            message: message.into(),
            retry_after,
        }
    }

    /// Create a vendor protocol error
    pub fn protocol(
        provider: impl Into<String>,
        fault: ProtocolFault,
        message: impl Into<String>,
    ) -> Self {
        Self::VendorProtocol {
            provider: provider.into(),
            fault,
            message: message.into(),
        }
    }

    /// Create a tool call error
    pub fn tool_call(message: impl Into<String>, tool: Option<String>) -> Self {
        Self::ToolCall {
            message: message.into(),
            tool,
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            status_code,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the variant itself marks the fault as transient.
    ///
    /// Message-signature classification lives in the resilience crate.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. }
                | Self::Timeout { .. }
                | Self::RateLimit { .. }
                | Self::VendorProtocol { .. }
        )
    }

    /// Whether this error must never be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ToolCall { .. } | Self::Cancelled
        )
    }

    /// Stable type tag for logs and trace records.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::TransientNetwork { .. } => "transient_network_error",
            Self::Timeout { .. } => "timeout_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::VendorProtocol { .. } => "vendor_protocol_error",
            Self::ToolCall { .. } => "tool_call_error",
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::Cancelled => "cancelled",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Message safe to show an end user. Never contains vendor payloads.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { .. } => {
                "The model is not configured correctly. Check the API key and model settings."
                    .to_string()
            }
            Self::TransientNetwork { .. } => {
                "The model service could not be reached. Please try again shortly.".to_string()
            }
            Self::Timeout { .. } => {
                "The model took too long to respond. Please try again.".to_string()
            }
            Self::RateLimit { .. } => {
                "The model service is busy or the quota is exhausted. Please wait and try again."
                    .to_string()
            }
            Self::VendorProtocol { fault, .. } => match fault {
                ProtocolFault::EmptyResult => {
                    "The model returned an empty response. Please try again.".to_string()
                }
                ProtocolFault::NoContent => {
                    "The model finished without producing any answer. Try rephrasing the request."
                        .to_string()
                }
                ProtocolFault::Malformed => {
                    "The model returned a response that could not be read. Please try again."
                        .to_string()
                }
            },
            Self::ToolCall { .. } => {
                "The model requested a tool that could not be used.".to_string()
            }
            Self::InvalidRequest { .. } => {
                "The request was rejected by the model service. Check the input and settings."
                    .to_string()
            }
            Self::Cancelled => "The request was cancelled.".to_string(),
            Self::Internal { .. } => "An unexpected error occurred.".to_string(),
        }
    }

    /// HTTP status associated with the failure, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::TransientNetwork { status_code, .. }
            | Self::InvalidRequest { status_code, .. } => *status_code,
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }
}
