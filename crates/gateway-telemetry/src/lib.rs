//! # Gateway Telemetry
//!
//! Observability for the LLM gateway.
//!
//! This crate provides:
//! - Structured logging setup
//! - Heuristic cost estimation with an owned price table
//! - Per-call traces with pluggable persistence and usage queries

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod logging;
pub mod trace;

// Re-export main types
pub use cost::{estimate_tokens, CostConfig, CostEstimate, CostEstimator, ModelPricing, PricingTable};
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use trace::{
    group_by_business_tag, usage_totals, ErrorSnapshot, InMemoryTraceStore, RequestSnapshot,
    ResponseSnapshot, Trace, TraceConfig, TraceHandle, TraceOutcome, TraceQuery, TraceRecorder,
    TraceStore, TraceStoreError, UsageTotals, DEFAULT_TRACE_CAPACITY,
};
