//! # Gateway Resilience
//!
//! Resilience patterns for the LLM gateway:
//! - Transient-fault classification of gateway errors
//! - Retry policy with exponential backoff and jitter

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod retry;

// Re-export main types
pub use classifier::{classify, classify_message, FaultClass};
pub use retry::{RetryConfig, RetryOutcome, RetryPolicy, RetryPolicyBuilder};
