//! # Gateway Service
//!
//! The gateway surface over the vendor adapters.
//!
//! This crate provides:
//! - `ModelGateway`: generate, stream, estimate cost, list models and
//!   validate credentials for one configured model
//! - `GatewayHub`: a directory of named gateways with proxy toggling
//! - `GatewayServices`: the retry policy, pipeline, estimator, recorder and
//!   catalog cache shared by a hub

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gateway;
pub mod hub;
mod observer;
pub mod services;

#[cfg(test)]
mod testing;

// Re-export main types
pub use gateway::{GatewayLifecycle, GenerateReport, ModelGateway};
pub use hub::GatewayHub;
pub use services::{
    cost_config, logging_config, retry_policy, streaming_config, trace_config, AdapterFactory,
    GatewayServices, GatewayServicesBuilder, DEFAULT_GENERATE_TIMEOUT,
};
