//! # Gateway Providers
//!
//! Vendor adapters behind the [`gateway_core::ProviderAdapter`] contract:
//! - OpenAI and the OpenAI-compatible vendors (DeepSeek, Qwen, OpenRouter,
//!   SiliconFlow, Grok, Ollama)
//! - Azure OpenAI
//! - Anthropic (Claude)
//! - Google Gemini
//!
//! Every vendor error is translated into [`gateway_core::GatewayError`]
//! before it leaves this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod azure;
pub mod google;
pub mod http;
pub mod openai;
pub mod registry;
pub mod sse;
pub mod tools;

// Re-export main types
pub use anthropic::AnthropicAdapter;
pub use azure::AzureOpenAiAdapter;
pub use google::GeminiAdapter;
pub use openai::OpenAiCompatibleAdapter;
pub use registry::{create_adapter, ModelCatalogCache, DEFAULT_CATALOG_TTL};
pub use tools::ToolCallAssembler;
