//! Components shared by every model gateway of a hub.

use gateway_config::{
    CostSettings, GatewayConfig, LoggingSettings, RetrySettings, StreamingSettings, TraceSettings,
};
use gateway_core::{GatewayResult, ProviderAdapter, ProviderAdapterConfig};
use gateway_providers::{create_adapter, ModelCatalogCache};
use gateway_resilience::{RetryPolicy, RetryPolicyBuilder};
use gateway_streaming::{StreamingConfig, StreamingPipeline};
use gateway_telemetry::{
    CostConfig, CostEstimator, LogFormat, LoggingConfig, ModelPricing, TraceConfig, TraceRecorder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Builds the adapter for a configuration
pub type AdapterFactory =
    Arc<dyn Fn(ProviderAdapterConfig) -> GatewayResult<Arc<dyn ProviderAdapter>> + Send + Sync>;

/// Overall deadline of a unary call
pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry policy, streaming pipeline, cost estimator, trace recorder and
/// model catalog cache.
pub struct GatewayServices {
    retry: RetryPolicy,
    pipeline: StreamingPipeline,
    cost: CostEstimator,
    traces: TraceRecorder,
    catalog: ModelCatalogCache,
    generate_timeout: Duration,
    factory: AdapterFactory,
}

impl GatewayServices {
    /// Create a builder
    #[must_use]
    pub fn builder() -> GatewayServicesBuilder {
        GatewayServicesBuilder::default()
    }

    /// Services described by a configuration
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let retry = retry_policy(&config.retry);
        Self::builder()
            .pipeline(StreamingPipeline::new(streaming_config(&config.streaming), retry.clone()))
            .retry(retry)
            .cost(CostEstimator::new(cost_config(&config.cost)))
            .traces(TraceRecorder::in_memory(trace_config(&config.trace)))
            .catalog(ModelCatalogCache::new(config.catalog_ttl))
            .generate_timeout(config.generate_timeout)
            .build()
    }

    /// Retry policy for unary calls and catalog fetches
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Streaming pipeline
    #[must_use]
    pub fn pipeline(&self) -> &StreamingPipeline {
        &self.pipeline
    }

    /// Cost estimator
    #[must_use]
    pub fn cost(&self) -> &CostEstimator {
        &self.cost
    }

    /// Trace recorder
    #[must_use]
    pub fn traces(&self) -> &TraceRecorder {
        &self.traces
    }

    /// Model catalog cache
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalogCache {
        &self.catalog
    }

    /// Overall deadline of a unary call
    #[must_use]
    pub fn generate_timeout(&self) -> Duration {
        self.generate_timeout
    }

    pub(crate) fn build_adapter(&self, config: ProviderAdapterConfig) -> GatewayResult<Arc<dyn ProviderAdapter>> {
        (self.factory)(config)
    }
}

impl Default for GatewayServices {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for GatewayServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServices")
            .field("retry", &self.retry)
            .field("pipeline", &self.pipeline)
            .field("traces", &self.traces)
            .field("generate_timeout", &self.generate_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GatewayServices`]
#[derive(Default)]
pub struct GatewayServicesBuilder {
    retry: Option<RetryPolicy>,
    pipeline: Option<StreamingPipeline>,
    cost: Option<CostEstimator>,
    traces: Option<TraceRecorder>,
    catalog: Option<ModelCatalogCache>,
    generate_timeout: Option<Duration>,
    factory: Option<AdapterFactory>,
}

impl GatewayServicesBuilder {
    /// Set the retry policy
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the streaming pipeline
    #[must_use]
    pub fn pipeline(mut self, pipeline: StreamingPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set the cost estimator
    #[must_use]
    pub fn cost(mut self, cost: CostEstimator) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the trace recorder
    #[must_use]
    pub fn traces(mut self, traces: TraceRecorder) -> Self {
        self.traces = Some(traces);
        self
    }

    /// Set the catalog cache
    #[must_use]
    pub fn catalog(mut self, catalog: ModelCatalogCache) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the unary deadline
    #[must_use]
    pub fn generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = Some(timeout);
        self
    }

    /// Replace adapter construction
    #[must_use]
    pub fn adapter_factory(mut self, factory: AdapterFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the services. The pipeline defaults to the retry policy given.
    #[must_use]
    pub fn build(self) -> GatewayServices {
        let retry = self.retry.unwrap_or_default();
        let factory: AdapterFactory = match self.factory {
            Some(factory) => factory,
            None => Arc::new(create_adapter),
        };
        let pipeline = self
            .pipeline
            .unwrap_or_else(|| StreamingPipeline::new(StreamingConfig::default(), retry.clone()));
        GatewayServices {
            pipeline,
            retry,
            cost: self.cost.unwrap_or_default(),
            traces: self
                .traces
                .unwrap_or_else(|| TraceRecorder::in_memory(TraceConfig::default())),
            catalog: self.catalog.unwrap_or_default(),
            generate_timeout: self.generate_timeout.unwrap_or(DEFAULT_GENERATE_TIMEOUT),
            factory,
        }
    }
}

/// Retry policy for a settings section
#[must_use]
pub fn retry_policy(settings: &RetrySettings) -> RetryPolicy {
    RetryPolicyBuilder::new()
        .max_retries(settings.max_retries)
        .base_delay(settings.base_delay)
        .max_delay(settings.max_delay)
        .jitter(settings.jitter)
        .build()
}

/// Pipeline tuning for a settings section
#[must_use]
pub fn streaming_config(settings: &StreamingSettings) -> StreamingConfig {
    StreamingConfig {
        heartbeat_interval: settings.heartbeat_interval,
        channel_capacity: settings.channel_capacity,
        timeout: settings.timeout,
    }
}

/// Estimator configuration for a settings section
#[must_use]
pub fn cost_config(settings: &CostSettings) -> CostConfig {
    CostConfig {
        currency_multiplier: settings.currency_multiplier,
        currency: settings.currency.clone(),
        default_output_tokens: settings.default_output_tokens,
        pricing_ttl: settings.pricing_ttl,
        overrides: settings
            .prices
            .iter()
            .map(|p| ModelPricing::new(p.provider, p.model.clone(), p.input_per_1k, p.output_per_1k))
            .collect(),
    }
}

/// Recorder configuration for a settings section
#[must_use]
pub fn trace_config(settings: &TraceSettings) -> TraceConfig {
    TraceConfig {
        enabled: settings.enabled,
        capacity: settings.capacity,
        log_traces: settings.log_traces,
    }
}

/// Subscriber configuration for a settings section. Unknown formats fall
/// back to compact output.
#[must_use]
pub fn logging_config(settings: &LoggingSettings) -> LoggingConfig {
    let format = settings.format.parse::<LogFormat>().unwrap_or_else(|e| {
        warn!(error = %e, "Falling back to compact log format");
        LogFormat::Compact
    });
    LoggingConfig {
        level: settings.level.clone(),
        format,
        with_file_line: settings.with_file_line,
        ..LoggingConfig::default()
    }
}
