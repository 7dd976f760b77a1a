//! Cost estimation for LLM calls.
//!
//! Provides:
//! - A heuristic token estimate (words × 1.3)
//! - A per-provider, per-model price table in USD per 1K tokens
//! - Provider default rates for models missing from the table
//! - A display multiplier for the configured currency

use gateway_core::{GenerationRequest, ProviderKind, TokenUsage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tokens per whitespace-separated word
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Estimate the token count of a text
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD).round() as u32
}

/// Cost estimation configuration
#[derive(Debug, Clone)]
pub struct CostConfig {
    /// Multiplier from USD to the display currency
    pub currency_multiplier: f64,
    /// Display currency code
    pub currency: String,
    /// Output tokens assumed when a request sets no limit
    pub default_output_tokens: u32,
    /// Age after which the price table is considered stale
    pub pricing_ttl: Duration,
    /// Extra or overriding model prices
    pub overrides: Vec<ModelPricing>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            currency_multiplier: 1.0,
            currency: "USD".to_string(),
            default_output_tokens: 500,
            pricing_ttl: Duration::from_secs(24 * 60 * 60),
            overrides: Vec::new(),
        }
    }
}

impl CostConfig {
    /// Set the display currency and its multiplier
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>, multiplier: f64) -> Self {
        self.currency = currency.into();
        self.currency_multiplier = multiplier;
        self
    }

    /// Add a price override
    #[must_use]
    pub fn with_override(mut self, pricing: ModelPricing) -> Self {
        self.overrides.push(pricing);
        self
    }
}

/// Model pricing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Provider
    pub provider: ProviderKind,
    /// Model id or id prefix
    pub model: String,
    /// Cost per 1K input tokens (USD)
    pub input_cost_per_1k: f64,
    /// Cost per 1K output tokens (USD)
    pub output_cost_per_1k: f64,
}

impl ModelPricing {
    /// Create split input/output pricing
    #[must_use]
    pub fn new(provider: ProviderKind, model: impl Into<String>, input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            input_cost_per_1k: input_per_1k,
            output_cost_per_1k: output_per_1k,
        }
    }

    /// Create pricing with one rate for input and output
    #[must_use]
    pub fn unified(provider: ProviderKind, model: impl Into<String>, per_1k: f64) -> Self {
        Self::new(provider, model, per_1k, per_1k)
    }

    /// Calculate cost for given token counts. Negative rates count as zero.
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (f64::from(input_tokens) / 1000.0) * self.input_cost_per_1k.max(0.0);
        let output_cost = (f64::from(output_tokens) / 1000.0) * self.output_cost_per_1k.max(0.0);
        input_cost + output_cost
    }
}

fn builtin_model_prices() -> Vec<ModelPricing> {
    use ProviderKind::{Anthropic, DeepSeek, Gemini, Grok, OpenAi, Qwen};
    vec![
        ModelPricing::new(OpenAi, "gpt-4o-mini", 0.000_15, 0.000_6),
        ModelPricing::new(OpenAi, "gpt-4o", 0.002_5, 0.01),
        ModelPricing::new(OpenAi, "gpt-4-turbo", 0.01, 0.03),
        ModelPricing::new(OpenAi, "gpt-4", 0.03, 0.06),
        ModelPricing::new(OpenAi, "gpt-3.5-turbo", 0.000_5, 0.001_5),
        ModelPricing::new(OpenAi, "o1-mini", 0.003, 0.012),
        ModelPricing::new(OpenAi, "o1", 0.015, 0.06),
        ModelPricing::new(Anthropic, "claude-3-5-sonnet", 0.003, 0.015),
        ModelPricing::new(Anthropic, "claude-3-5-haiku", 0.000_8, 0.004),
        ModelPricing::new(Anthropic, "claude-3-opus", 0.015, 0.075),
        ModelPricing::new(Anthropic, "claude-3-haiku", 0.000_25, 0.001_25),
        ModelPricing::new(Gemini, "gemini-1.5-pro", 0.001_25, 0.005),
        ModelPricing::new(Gemini, "gemini-1.5-flash", 0.000_075, 0.000_3),
        ModelPricing::new(Gemini, "gemini-2.0-flash", 0.000_1, 0.000_4),
        ModelPricing::new(DeepSeek, "deepseek-chat", 0.000_27, 0.001_1),
        ModelPricing::new(DeepSeek, "deepseek-reasoner", 0.000_55, 0.002_19),
        ModelPricing::new(Qwen, "qwen-max", 0.001_6, 0.006_4),
        ModelPricing::new(Qwen, "qwen-plus", 0.000_4, 0.001_2),
        ModelPricing::new(Qwen, "qwen-turbo", 0.000_05, 0.000_2),
        ModelPricing::new(Grok, "grok-2", 0.002, 0.01),
    ]
}

fn builtin_provider_default(provider: ProviderKind) -> ModelPricing {
    match provider {
        ProviderKind::OpenAi | ProviderKind::AzureOpenAi => ModelPricing::new(provider, "*", 0.002_5, 0.01),
        ProviderKind::Anthropic => ModelPricing::new(provider, "*", 0.003, 0.015),
        ProviderKind::Gemini => ModelPricing::new(provider, "*", 0.001_25, 0.005),
        ProviderKind::DeepSeek => ModelPricing::new(provider, "*", 0.000_27, 0.001_1),
        ProviderKind::Qwen => ModelPricing::new(provider, "*", 0.000_4, 0.001_2),
        ProviderKind::OpenRouter => ModelPricing::unified(provider, "*", 0.002),
        ProviderKind::SiliconFlow => ModelPricing::unified(provider, "*", 0.001),
        ProviderKind::Grok => ModelPricing::new(provider, "*", 0.002, 0.01),
        ProviderKind::Ollama => ModelPricing::unified(provider, "*", 0.0),
    }
}

struct PricingEntries {
    models: HashMap<ProviderKind, Vec<ModelPricing>>,
    overrides: Vec<ModelPricing>,
    loaded_at: Instant,
}

/// Price table owned by a [`CostEstimator`].
///
/// Model ids match by longest prefix, so dated ids such as
/// `gpt-4o-2024-08-06` resolve to the `gpt-4o` row.
pub struct PricingTable {
    entries: RwLock<PricingEntries>,
    ttl: Duration,
}

impl PricingTable {
    /// Built-in prices plus the given overrides
    #[must_use]
    pub fn new(overrides: Vec<ModelPricing>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(Self::build(overrides)),
            ttl,
        }
    }

    fn build(overrides: Vec<ModelPricing>) -> PricingEntries {
        let mut models: HashMap<ProviderKind, Vec<ModelPricing>> = HashMap::new();
        for pricing in builtin_model_prices().into_iter().chain(overrides.iter().cloned()) {
            let rows = models.entry(pricing.provider).or_default();
            rows.retain(|p| p.model != pricing.model);
            rows.push(pricing);
        }
        PricingEntries {
            models,
            overrides,
            loaded_at: Instant::now(),
        }
    }

    /// Resolve pricing, falling back to the provider default
    #[must_use]
    pub fn lookup(&self, provider: ProviderKind, model: &str) -> ModelPricing {
        let entries = self.entries.read();
        let model = model.to_ascii_lowercase();
        entries
            .models
            .get(&provider)
            .and_then(|rows| {
                rows.iter()
                    .filter(|p| p.model != "*" && model.starts_with(&p.model.to_ascii_lowercase()))
                    .max_by_key(|p| p.model.len())
            })
            .cloned()
            .or_else(|| {
                entries
                    .models
                    .get(&provider)
                    .and_then(|rows| rows.iter().find(|p| p.model == "*"))
                    .cloned()
            })
            .unwrap_or_else(|| builtin_provider_default(provider))
    }

    /// Whether the table is older than its TTL
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.entries.read().loaded_at.elapsed() >= self.ttl
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace every override and reset the table age
    pub fn reload(&self, overrides: Vec<ModelPricing>) {
        debug!(overrides = overrides.len(), "Reloading price table");
        *self.entries.write() = Self::build(overrides);
    }

    /// Rebuild from the built-in prices and the current overrides
    pub fn invalidate(&self) {
        let mut entries = self.entries.write();
        debug!(overrides = entries.overrides.len(), "Rebuilding price table");
        *entries = Self::build(std::mem::take(&mut entries.overrides));
    }

    /// Rebuild once the TTL has passed. Returns whether a rebuild happened.
    pub fn refresh_if_stale(&self) -> bool {
        if !self.is_stale() {
            return false;
        }
        let mut entries = self.entries.write();
        // Another caller may have rebuilt while we waited for the lock
        if entries.loaded_at.elapsed() < self.ttl {
            return false;
        }
        debug!(ttl_secs = self.ttl.as_secs(), "Price table stale, rebuilding");
        *entries = Self::build(std::mem::take(&mut entries.overrides));
        true
    }
}

/// Estimated cost of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Estimated input tokens
    pub input_tokens: u32,
    /// Estimated output tokens
    pub output_tokens: u32,
    /// Cost in USD
    pub cost_usd: f64,
    /// Cost in the display currency
    pub amount: f64,
    /// Display currency code
    pub currency: String,
}

/// Heuristic cost estimator
pub struct CostEstimator {
    config: CostConfig,
    pricing: PricingTable,
}

impl CostEstimator {
    /// Create a new estimator
    #[must_use]
    pub fn new(config: CostConfig) -> Self {
        let pricing = PricingTable::new(config.overrides.clone(), config.pricing_ttl);
        Self { config, pricing }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CostConfig::default())
    }

    /// The price table
    #[must_use]
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    /// Price row for a model, rebuilding a stale table first
    #[must_use]
    pub fn price(&self, provider: ProviderKind, model: &str) -> ModelPricing {
        self.pricing.refresh_if_stale();
        self.pricing.lookup(provider, model)
    }

    fn to_display(&self, usd: f64) -> f64 {
        usd * self.config.currency_multiplier.max(0.0)
    }

    /// Estimate the cost of a request before it is sent
    #[must_use]
    pub fn estimate(&self, provider: ProviderKind, model: &str, request: &GenerationRequest) -> CostEstimate {
        let input_tokens = estimate_tokens(&request.prompt_text());
        let output_tokens = request
            .parameters()
            .max_output_tokens
            .unwrap_or(self.config.default_output_tokens);
        let cost_usd = self.price(provider, model).calculate_cost(input_tokens, output_tokens);
        CostEstimate {
            input_tokens,
            output_tokens,
            cost_usd,
            amount: self.to_display(cost_usd),
            currency: self.config.currency.clone(),
        }
    }

    /// Estimated cost of a request in the display currency
    #[must_use]
    pub fn estimate_cost(&self, provider: ProviderKind, model: &str, request: &GenerationRequest) -> f64 {
        self.estimate(provider, model, request).amount
    }

    /// Cost of reported usage in the display currency
    #[must_use]
    pub fn cost_of_usage(&self, provider: ProviderKind, model: &str, usage: &TokenUsage) -> f64 {
        let usd = self
            .price(provider, model)
            .calculate_cost(usage.input_tokens, usage.output_tokens);
        self.to_display(usd)
    }
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self::with_defaults()
    }
}
