//! Configuration model.

use gateway_core::{ProviderAdapterConfig, ProviderKind, ProxyConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Top-level gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Configured models, one gateway each
    pub models: Vec<ModelEntry>,
    /// Outbound proxy shared by every model
    pub proxy: ProxySettings,
    /// Retry policy
    pub retry: RetrySettings,
    /// Streaming pipeline
    pub streaming: StreamingSettings,
    /// Overall deadline of a unary call
    #[serde(with = "humantime_serde")]
    pub generate_timeout: Duration,
    /// Cost estimation
    pub cost: CostSettings,
    /// Call tracing
    pub trace: TraceSettings,
    /// Logging
    pub logging: LoggingSettings,
    /// Model catalog cache lifetime
    #[serde(with = "humantime_serde")]
    pub catalog_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            proxy: ProxySettings::default(),
            retry: RetrySettings::default(),
            streaming: StreamingSettings::default(),
            generate_timeout: Duration::from_secs(120),
            cost: CostSettings::default(),
            trace: TraceSettings::default(),
            logging: LoggingSettings::default(),
            catalog_ttl: Duration::from_secs(600),
        }
    }
}

impl GatewayConfig {
    /// Find a model entry by name
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Enabled model entries
    pub fn enabled_models(&self) -> impl Iterator<Item = &ModelEntry> {
        self.models.iter().filter(|m| m.enabled)
    }

    /// Proxy to apply to outbound calls, if enabled
    #[must_use]
    pub fn active_proxy(&self) -> Option<&ProxyConfig> {
        if self.proxy.enabled {
            self.proxy.server.as_ref()
        } else {
            None
        }
    }

    /// Check the configuration for inconsistencies
    ///
    /// # Errors
    /// Returns every problem found.
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        let mut problems = Vec::new();
        let mut names = HashSet::new();

        for entry in &self.models {
            if entry.name.trim().is_empty() {
                problems.push("model entry with an empty name".to_string());
            } else if !names.insert(entry.name.as_str()) {
                problems.push(format!("duplicate model name '{}'", entry.name));
            }
            if entry.model.trim().is_empty() {
                problems.push(format!("model '{}' has no vendor model id", entry.name));
            }
            if entry.provider == ProviderKind::AzureOpenAi && entry.endpoint.is_none() {
                problems.push(format!("model '{}' uses azure_openai without an endpoint", entry.name));
            }
            if let Some(endpoint) = &entry.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    problems.push(format!("model '{}' endpoint must be an http(s) URL", entry.name));
                }
            }
        }

        if self.proxy.enabled {
            match &self.proxy.server {
                None => problems.push("proxy is enabled but no proxy server is set".to_string()),
                Some(server) => {
                    if server.host.trim().is_empty() {
                        problems.push("proxy host is empty".to_string());
                    }
                    if server.port == 0 {
                        problems.push("proxy port must be non-zero".to_string());
                    }
                }
            }
        }

        if !(0.0..=1.0).contains(&self.retry.jitter) {
            problems.push(format!("retry.jitter must be within 0.0..=1.0, got {}", self.retry.jitter));
        }
        if self.retry.base_delay > self.retry.max_delay {
            problems.push("retry.base_delay exceeds retry.max_delay".to_string());
        }
        if self.streaming.channel_capacity == 0 {
            problems.push("streaming.channel_capacity must be positive".to_string());
        }
        if self.streaming.heartbeat_interval.is_zero() {
            problems.push("streaming.heartbeat_interval must be positive".to_string());
        }
        if self.cost.currency_multiplier < 0.0 {
            problems.push("cost.currency_multiplier must not be negative".to_string());
        }
        for price in &self.cost.prices {
            if price.input_per_1k < 0.0 || price.output_per_1k < 0.0 {
                problems.push(format!("price for {}/{} is negative", price.provider, price.model));
            }
        }
        if self.trace.capacity == 0 {
            problems.push("trace.capacity must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::ConfigError::Validation(problems))
        }
    }
}

/// One configured model
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    /// Unique name used to address this model
    pub name: String,
    /// Vendor
    pub provider: ProviderKind,
    /// Vendor model id; the deployment name for Azure
    pub model: String,
    /// Inline API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,
    /// HTTP timeout override
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    /// Whether this model is served
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ModelEntry {
    /// Resolve the API key from the process environment
    #[must_use]
    pub fn resolve_api_key(&self) -> SecretString {
        self.resolve_api_key_with(|var| std::env::var(var).ok())
    }

    /// Resolve the API key. An inline key wins over `api_key_env`. A missing
    /// key resolves to an empty secret; calls then fail fast without
    /// reaching the vendor.
    #[must_use]
    pub fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> SecretString {
        if let Some(key) = &self.api_key {
            if !key.expose_secret().trim().is_empty() {
                return key.clone();
            }
        }
        if let Some(var) = &self.api_key_env {
            if let Some(value) = lookup(var) {
                return SecretString::new(value);
            }
            warn!(model = %self.name, env = %var, "API key environment variable is not set");
        }
        SecretString::new(String::new())
    }

    /// Adapter configuration for this entry
    #[must_use]
    pub fn adapter_config(&self, proxy: Option<&ProxyConfig>) -> ProviderAdapterConfig {
        self.adapter_config_with(proxy, |var| std::env::var(var).ok())
    }

    /// Adapter configuration for this entry with an explicit env lookup
    #[must_use]
    pub fn adapter_config_with(
        &self,
        proxy: Option<&ProxyConfig>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ProviderAdapterConfig {
        let mut config = ProviderAdapterConfig::new(self.provider, self.model.clone(), String::new());
        config.api_key = self.resolve_api_key_with(lookup);
        config.endpoint.clone_from(&self.endpoint);
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        config.with_proxy(proxy.cloned())
    }
}

/// Shared outbound proxy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxySettings {
    /// Whether the proxy is in use
    pub enabled: bool,
    /// Proxy server
    pub server: Option<ProxyConfig>,
}

/// Retry policy settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Backoff cap
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

/// Streaming pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingSettings {
    /// Keep-alive interval
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Content channel capacity
    pub channel_capacity: usize,
    /// Overall deadline of a stream
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            channel_capacity: 64,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Price override in USD per 1K tokens
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceEntry {
    /// Vendor
    pub provider: ProviderKind,
    /// Model id prefix, or `*` for the vendor default
    pub model: String,
    /// Input rate
    pub input_per_1k: f64,
    /// Output rate
    pub output_per_1k: f64,
}

/// Cost estimation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostSettings {
    /// Display currency code
    pub currency: String,
    /// Multiplier from USD to the display currency
    pub currency_multiplier: f64,
    /// Output tokens assumed when a request sets no limit
    pub default_output_tokens: u32,
    /// Price table age after which it is reported stale
    #[serde(with = "humantime_serde")]
    pub pricing_ttl: Duration,
    /// Price overrides
    pub prices: Vec<PriceEntry>,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            currency_multiplier: 1.0,
            default_output_tokens: 500,
            pricing_ttl: Duration::from_secs(24 * 60 * 60),
            prices: Vec::new(),
        }
    }
}

/// Call tracing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceSettings {
    /// Whether traces are recorded
    pub enabled: bool,
    /// In-memory store capacity
    pub capacity: usize,
    /// Log every finished call
    pub log_traces: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            log_traces: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive
    pub level: String,
    /// `compact`, `pretty` or `json`
    pub format: String,
    /// Include source file and line
    pub with_file_line: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            with_file_line: false,
        }
    }
}
