//! Test helper utilities for integration tests

use gateway_core::{ProviderAdapterConfig, ProviderKind};
use gateway_resilience::{RetryPolicy, RetryPolicyBuilder};
use gateway_service::{GatewayServices, ModelGateway};
use gateway_streaming::{StreamingConfig, StreamingPipeline};
use gateway_telemetry::{Trace, TraceConfig, TraceQuery, TraceRecorder};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Retry policy with the production shape but millisecond delays
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicyBuilder::new()
        .max_retries(max_retries)
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(40))
        .jitter(0.0)
        .build()
}

/// Knobs for [`services`]
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub max_retries: u32,
    pub heartbeat_interval: Duration,
    pub stream_timeout: Duration,
    pub generate_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_retries: 2,
            heartbeat_interval: Duration::from_secs(15),
            stream_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared services using the real adapter factory
pub fn services(options: &ServiceOptions) -> Arc<GatewayServices> {
    let retry = fast_retry(options.max_retries);
    let streaming = StreamingConfig {
        heartbeat_interval: options.heartbeat_interval,
        timeout: options.stream_timeout,
        ..StreamingConfig::default()
    };
    Arc::new(
        GatewayServices::builder()
            .pipeline(StreamingPipeline::new(streaming, retry.clone()))
            .retry(retry)
            .traces(TraceRecorder::in_memory(TraceConfig::default()))
            .generate_timeout(options.generate_timeout)
            .build(),
    )
}

/// Adapter configuration pointing at a mock server
pub fn mock_config(provider: ProviderKind, model: &str, endpoint: &str) -> ProviderAdapterConfig {
    ProviderAdapterConfig::new(provider, model, "sk-test-key")
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(5))
}

/// A ready gateway in front of a mock server
pub fn gateway(provider: ProviderKind, model: &str, endpoint: &str, options: &ServiceOptions) -> ModelGateway {
    init_tracing();
    let gateway = ModelGateway::new("test", mock_config(provider, model, endpoint), services(options));
    assert!(gateway.is_ready(), "gateway should initialize: {:?}", gateway.lifecycle());
    gateway
}

/// Poll the recorder until `count` finalized traces exist. Persistence runs
/// on spawned tasks.
pub async fn wait_for_traces(recorder: &TraceRecorder, count: usize) -> Vec<Trace> {
    for _ in 0..100 {
        let traces = recorder.query(&TraceQuery::default()).await.unwrap_or_default();
        if traces.iter().filter(|t| t.is_terminal()).count() >= count {
            return traces;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} finalized traces");
}
