//! Provider adapter contract and adapter configuration.

use crate::error::{GatewayError, GatewayResult};
use crate::request::{GenerationRequest, Message};
use crate::response::GenerationResponse;
use crate::streaming::StreamChunk;
use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Stream of decoded vendor chunks.
pub type ChunkStream = BoxStream<'static, GatewayResult<StreamChunk>>;

/// Supported vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI
    OpenAi,
    /// Azure OpenAI
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    /// Anthropic Claude
    Anthropic,
    /// Google Gemini
    Gemini,
    /// DeepSeek
    DeepSeek,
    /// Alibaba Qwen (DashScope compatible mode)
    Qwen,
    /// OpenRouter
    OpenRouter,
    /// SiliconFlow
    SiliconFlow,
    /// xAI Grok
    Grok,
    /// Local Ollama
    Ollama,
}

impl ProviderKind {
    /// All known kinds
    pub const ALL: [Self; 10] = [
        Self::OpenAi,
        Self::AzureOpenAi,
        Self::Anthropic,
        Self::Gemini,
        Self::DeepSeek,
        Self::Qwen,
        Self::OpenRouter,
        Self::SiliconFlow,
        Self::Grok,
        Self::Ollama,
    ];

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Qwen => "qwen",
            Self::OpenRouter => "openrouter",
            Self::SiliconFlow => "siliconflow",
            Self::Grok => "grok",
            Self::Ollama => "ollama",
        }
    }

    /// Whether the vendor speaks the OpenAI chat-completions wire format
    #[must_use]
    pub fn is_openai_compatible(self) -> bool {
        !matches!(self, Self::Anthropic | Self::Gemini)
    }

    /// Default API base URL. Azure has none; its endpoint is per resource.
    #[must_use]
    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::AzureOpenAi => None,
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::SiliconFlow => Some("https://api.siliconflow.cn/v1"),
            Self::Grok => Some("https://api.x.ai/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "openai" => Self::OpenAi,
            "azure" | "azure_openai" => Self::AzureOpenAi,
            "anthropic" | "claude" => Self::Anthropic,
            "gemini" | "google" => Self::Gemini,
            "deepseek" => Self::DeepSeek,
            "qwen" | "dashscope" => Self::Qwen,
            "openrouter" => Self::OpenRouter,
            "siliconflow" => Self::SiliconFlow,
            "grok" | "xai" => Self::Grok,
            "ollama" => Self::Ollama,
            other => {
                return Err(GatewayError::configuration(format!(
                    "unknown provider '{other}'"
                )))
            }
        };
        Ok(kind)
    }
}

/// Proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// HTTP CONNECT proxy
    #[default]
    Http,
    /// SOCKS5 proxy
    Socks,
}

/// Outbound proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Proxy protocol
    #[serde(default)]
    pub kind: ProxyKind,
    /// Accept any TLS certificate. Diagnostics only.
    #[serde(default)]
    pub trust_all_certs: bool,
}

impl ProxyConfig {
    /// Proxy URL understood by the HTTP client
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = match self.kind {
            ProxyKind::Http => "http",
            ProxyKind::Socks => "socks5h",
        };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Configuration owned by one adapter instance.
#[derive(Debug, Clone)]
pub struct ProviderAdapterConfig {
    /// Vendor
    pub provider: ProviderKind,
    /// Model name sent to the vendor
    pub model: String,
    /// API key
    pub api_key: SecretString,
    /// Endpoint override
    pub endpoint: Option<String>,
    /// Per-call HTTP timeout
    pub timeout: Duration,
    /// Outbound proxy
    pub proxy: Option<ProxyConfig>,
}

impl ProviderAdapterConfig {
    /// Create a configuration with the default timeout
    pub fn new(provider: ProviderKind, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: SecretString::new(api_key.into()),
            endpoint: None,
            timeout: Duration::from_secs(120),
            proxy: None,
        }
    }

    /// Set the endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set or clear the proxy
    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Whether a non-blank API key is present
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }

    /// Endpoint override, falling back to the vendor default
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.endpoint
            .clone()
            .or_else(|| self.provider.default_endpoint().map(ToString::to_string))
            .map(|url| url.trim_end_matches('/').to_string())
    }
}

/// A model offered by a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model id
    pub id: String,
    /// Display name
    pub name: String,
    /// Context window in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    /// Output token limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// USD per 1k input tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_price_per_1k: Option<f64>,
    /// USD per 1k output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_price_per_1k: Option<f64>,
}

impl ModelInfo {
    /// Create a model entry named after its id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            context_length: None,
            max_output_tokens: None,
            input_price_per_1k: None,
            output_price_per_1k: None,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the context window
    #[must_use]
    pub fn with_context_length(mut self, tokens: u32) -> Self {
        self.context_length = Some(tokens);
        self
    }

    /// Set the output limit
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Set USD prices per 1k tokens
    #[must_use]
    pub fn with_pricing(mut self, input: f64, output: f64) -> Self {
        self.input_price_per_1k = Some(input);
        self.output_price_per_1k = Some(output);
        self
    }
}

/// One adapter per vendor. Adapters hold immutable configuration and a
/// vendor client; they never keep per-request mutable state.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Vendor kind
    fn kind(&self) -> ProviderKind;

    /// Adapter configuration
    fn config(&self) -> &ProviderAdapterConfig;

    /// Configured model name
    fn model(&self) -> &str {
        &self.config().model
    }

    /// Unary generation
    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GenerationResponse>;

    /// Streaming generation. Errors returned here happen before any chunk.
    async fn generate_stream(&self, request: &GenerationRequest) -> GatewayResult<ChunkStream>;

    /// Model catalog using explicit credentials
    async fn list_models_with_api_key(
        &self,
        api_key: &SecretString,
        endpoint: Option<&str>,
    ) -> GatewayResult<Vec<ModelInfo>>;

    /// Model catalog using the configured credentials
    async fn list_models(&self) -> GatewayResult<Vec<ModelInfo>> {
        let config = self.config();
        self.list_models_with_api_key(&config.api_key, config.endpoint.as_deref())
            .await
    }

    /// Probe the vendor with one minimal call
    async fn validate_api_key(&self) -> bool {
        let probe = match GenerationRequest::builder()
            .message(Message::user("ping"))
            .max_output_tokens(1)
            .build()
        {
            Ok(request) => request,
            Err(_) => return false,
        };
        matches!(self.generate(&probe).await, Ok(response) if response.is_success())
    }
}
