//! # Gateway Config
//!
//! Configuration for the LLM gateway: the model list, shared proxy, retry,
//! streaming, cost, trace and logging sections. Files are YAML, TOML or JSON
//! and durations use humantime notation (`15s`, `2m`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gateway;
pub mod loader;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use gateway::{
    CostSettings, GatewayConfig, LoggingSettings, ModelEntry, PriceEntry, ProxySettings,
    RetrySettings, StreamingSettings, TraceSettings,
};
pub use loader::{load_config, ConfigFormat, ConfigLoader, ENV_LOG_FORMAT, ENV_LOG_LEVEL};
