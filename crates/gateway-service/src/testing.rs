//! Scripted adapter for unit tests.

use crate::services::{AdapterFactory, GatewayServices};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gateway_core::{
    ChunkStream, FinishReason, GatewayError, GatewayResult, GenerationRequest, GenerationResponse, ModelInfo,
    ProviderAdapter, ProviderAdapterConfig, ProviderKind, StreamChunk, TokenUsage,
};
use gateway_resilience::RetryPolicy;
use gateway_streaming::{StreamingConfig, StreamingPipeline};
use parking_lot::Mutex;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct Script {
    pub unary: Mutex<VecDeque<GatewayResult<GenerationResponse>>>,
    pub streams: Mutex<VecDeque<GatewayResult<Vec<StreamChunk>>>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub built: AtomicUsize,
}

impl Script {
    pub fn push(&self, result: GatewayResult<GenerationResponse>) {
        self.unary.lock().push_back(result);
    }

    pub fn push_stream(&self, result: GatewayResult<Vec<StreamChunk>>) {
        self.streams.lock().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn ok(text: &str) -> GatewayResult<GenerationResponse> {
    Ok(GenerationResponse::success(text, FinishReason::Stop, TokenUsage::new(5, 3)))
}

pub(crate) fn transient() -> GatewayResult<GenerationResponse> {
    Err(GatewayError::transient("stub", "connection reset by peer", None))
}

pub(crate) struct StubAdapter {
    config: ProviderAdapterConfig,
    script: Arc<Script>,
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn kind(&self) -> ProviderKind {
        self.config.provider
    }

    fn config(&self) -> &ProviderAdapterConfig {
        &self.config
    }

    async fn generate(&self, _request: &GenerationRequest) -> GatewayResult<GenerationResponse> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.script.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script.unary.lock().pop_front().unwrap_or_else(|| ok("default"))
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> GatewayResult<ChunkStream> {
        self.script.stream_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .script
            .streams
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![StreamChunk::text("default"), StreamChunk::finish(FinishReason::Stop, None)]))?;
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn list_models_with_api_key(
        &self,
        _api_key: &SecretString,
        _endpoint: Option<&str>,
    ) -> GatewayResult<Vec<ModelInfo>> {
        self.script.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ModelInfo::new(self.config.model.clone())])
    }
}

pub(crate) fn stub_factory(script: &Arc<Script>) -> AdapterFactory {
    let script = Arc::clone(script);
    Arc::new(move |config: ProviderAdapterConfig| {
        if config.model == "unbuildable" {
            return Err(GatewayError::configuration("cannot build adapter"));
        }
        script.built.fetch_add(1, Ordering::SeqCst);
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(StubAdapter {
            config,
            script: Arc::clone(&script),
        });
        Ok(adapter)
    })
}

pub(crate) fn stub_services(script: &Arc<Script>) -> Arc<GatewayServices> {
    let retry = RetryPolicy::default();
    Arc::new(
        GatewayServices::builder()
            .pipeline(StreamingPipeline::new(StreamingConfig::default(), retry.clone()))
            .retry(retry)
            .adapter_factory(stub_factory(script))
            .build(),
    )
}

pub(crate) fn stub_config(model: &str) -> ProviderAdapterConfig {
    ProviderAdapterConfig::new(ProviderKind::OpenAi, model, "sk-test")
}
