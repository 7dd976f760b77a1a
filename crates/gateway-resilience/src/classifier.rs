//! Transient-fault classification.
//!
//! The error variant decides first. Errors whose variant is ambiguous
//! (`InvalidRequest`, `Internal`) are classified by matching their message
//! against known vendor signatures, since several vendors report throttling
//! or overload with a 400 and a free-text body.

use gateway_core::GatewayError;
use once_cell::sync::Lazy;
use regex::Regex;

/// How a failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Retry with the normal backoff
    Transient,
    /// Retry with the longer rate-limit backoff
    RateLimited,
    /// Never retry
    Fatal,
}

impl FaultClass {
    /// Whether the policy may retry this class
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

#[allow(clippy::expect_used)]
static RATE_LIMIT_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate.?limit|quota|too many requests|\b429\b|resource.?exhausted")
        .expect("rate limit signature is a valid regex")
});

#[allow(clippy::expect_used)]
static TRANSIENT_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)timed? ?out|connection (reset|refused|closed)|broken pipe|upstream.{0,20}busy|overloaded|temporarily unavailable|service unavailable|\b50[234]\b|unexpected eof",
    )
    .expect("transient signature is a valid regex")
});

/// Classify an error for retry purposes.
#[must_use]
pub fn classify(error: &GatewayError) -> FaultClass {
    match error {
        GatewayError::Configuration { .. } | GatewayError::ToolCall { .. } | GatewayError::Cancelled => {
            FaultClass::Fatal
        }
        GatewayError::RateLimit { .. } => FaultClass::RateLimited,
        GatewayError::TransientNetwork { message, .. } => {
            if RATE_LIMIT_SIGNATURE.is_match(message) {
                FaultClass::RateLimited
            } else {
                FaultClass::Transient
            }
        }
        GatewayError::Timeout { .. } | GatewayError::VendorProtocol { .. } => FaultClass::Transient,
        GatewayError::InvalidRequest { message, .. } | GatewayError::Internal { message } => {
            classify_message(message)
        }
    }
}

/// Classify free text by vendor signature alone.
#[must_use]
pub fn classify_message(message: &str) -> FaultClass {
    if RATE_LIMIT_SIGNATURE.is_match(message) {
        FaultClass::RateLimited
    } else if TRANSIENT_SIGNATURE.is_match(message) {
        FaultClass::Transient
    } else {
        FaultClass::Fatal
    }
}
