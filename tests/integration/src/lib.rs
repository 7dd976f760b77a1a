//! Integration tests for the LLM gateway
//!
//! Every test drives the real adapters over HTTP against wiremock servers
//! that speak the vendor wire formats:
//! - Vendor adapters (unary, streaming, catalogs, error mapping)
//! - Model gateways (retries, deadlines, traces, cost)
//! - The streaming pipeline (heartbeats, retry before first content,
//!   cancellation)
//! - Configuration-driven hubs

pub mod fixtures;
pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod gateway_tests;
#[cfg(test)]
mod provider_tests;
#[cfg(test)]
mod streaming_tests;
