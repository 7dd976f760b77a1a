//! # Gateway Streaming
//!
//! Turns a vendor chunk stream into the merged gateway event sequence:
//! - A producer task drives the vendor stream into a bounded channel
//! - A heartbeat task emits keep-alives until the stream terminates
//! - The consumer-side merge prefers content and ends after one terminal event
//!
//! Retries happen only before the first content delta reaches the consumer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod heartbeat;
pub mod pipeline;
pub mod wire;

// Re-export main types
pub use heartbeat::{spawn_heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
pub use pipeline::{
    GatewayStream, NoopObserver, StreamObserver, StreamingConfig, StreamingPipeline,
    DEFAULT_STREAM_TIMEOUT,
};
pub use wire::{decode, encode, is_done, is_heartbeat, WireFrame, DONE_SENTINEL, HEARTBEAT_SENTINEL};
