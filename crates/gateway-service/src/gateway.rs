//! One gateway per configured model.
//!
//! A [`ModelGateway`] owns the adapter of its model and routes every call
//! through the shared retry policy, streaming pipeline, trace recorder and
//! catalog cache. The adapter sits behind an [`ArcSwap`]: re-initialization
//! builds a new adapter and swaps it in, while calls already in flight keep
//! the `Arc` they loaded.

use crate::observer::TraceObserver;
use crate::services::GatewayServices;
use arc_swap::ArcSwap;
use gateway_core::{
    GatewayError, GatewayResult, GenerationRequest, GenerationResponse, ModelInfo, ProviderAdapter,
    ProviderAdapterConfig, ProviderKind, ProxyConfig,
};
use gateway_streaming::GatewayStream;
use gateway_telemetry::{gateway_call_span, CostEstimate};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Lifecycle of a model gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayLifecycle {
    /// Created, adapter not built yet
    Uninitialized,
    /// Adapter being built
    Initializing,
    /// Serving calls
    Ready,
    /// Adapter construction failed; calls fail fast
    Degraded,
}

impl fmt::Display for GatewayLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

enum AdapterSlot {
    Uninitialized,
    Initializing,
    Ready(Arc<dyn ProviderAdapter>),
    Degraded(String),
}

/// Outcome of a unary call with retry statistics
#[derive(Debug)]
pub struct GenerateReport {
    /// Response or final error
    pub result: GatewayResult<GenerationResponse>,
    /// Retries made after the first attempt
    pub retries: u32,
    /// Wall-clock duration, backoff included
    pub duration: Duration,
}

/// Gateway of one configured model
pub struct ModelGateway {
    name: String,
    config: ArcSwap<ProviderAdapterConfig>,
    slot: ArcSwap<AdapterSlot>,
    services: Arc<GatewayServices>,
}

impl ModelGateway {
    /// Create a gateway without building its adapter
    #[must_use]
    pub fn uninitialized(name: impl Into<String>, config: ProviderAdapterConfig, services: Arc<GatewayServices>) -> Self {
        Self {
            name: name.into(),
            config: ArcSwap::from_pointee(config),
            slot: ArcSwap::from_pointee(AdapterSlot::Uninitialized),
            services,
        }
    }

    /// Create and initialize a gateway. A construction failure leaves it
    /// degraded rather than failing.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ProviderAdapterConfig, services: Arc<GatewayServices>) -> Self {
        let gateway = Self::uninitialized(name, config, services);
        // Degraded gateways report the failure on every call
        let _ = gateway.initialize();
        gateway
    }

    /// Gateway name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current adapter configuration
    #[must_use]
    pub fn config(&self) -> Arc<ProviderAdapterConfig> {
        self.config.load_full()
    }

    /// Vendor
    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.config.load().provider
    }

    /// Vendor model id
    #[must_use]
    pub fn model(&self) -> String {
        self.config.load().model.clone()
    }

    /// Shared services
    #[must_use]
    pub fn services(&self) -> &Arc<GatewayServices> {
        &self.services
    }

    /// Lifecycle state
    #[must_use]
    pub fn lifecycle(&self) -> GatewayLifecycle {
        match **self.slot.load() {
            AdapterSlot::Uninitialized => GatewayLifecycle::Uninitialized,
            AdapterSlot::Initializing => GatewayLifecycle::Initializing,
            AdapterSlot::Ready(_) => GatewayLifecycle::Ready,
            AdapterSlot::Degraded(_) => GatewayLifecycle::Degraded,
        }
    }

    /// Whether calls can be served
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lifecycle() == GatewayLifecycle::Ready
    }

    /// Build the adapter from the current configuration
    ///
    /// # Errors
    /// Returns the construction error; the gateway is then degraded.
    pub fn initialize(&self) -> GatewayResult<()> {
        self.slot.store(Arc::new(AdapterSlot::Initializing));
        self.install(self.config.load_full())
    }

    /// Replace the configuration and swap in a freshly built adapter.
    /// Calls in flight finish on the adapter they started with.
    ///
    /// # Errors
    /// Returns the construction error; the gateway is then degraded.
    pub fn reinitialize(&self, config: ProviderAdapterConfig) -> GatewayResult<()> {
        info!(
            gateway = %self.name,
            provider = %config.provider,
            model = %config.model,
            "Re-initializing model gateway"
        );
        let previous = self.config.load().provider;
        self.services.catalog().invalidate(previous);
        self.install(Arc::new(config))
    }

    /// Re-initialize with a different proxy setting
    ///
    /// # Errors
    /// See [`ModelGateway::reinitialize`].
    pub fn set_proxy(&self, proxy: Option<ProxyConfig>) -> GatewayResult<()> {
        let config = (*self.config.load_full()).clone().with_proxy(proxy);
        self.reinitialize(config)
    }

    fn install(&self, config: Arc<ProviderAdapterConfig>) -> GatewayResult<()> {
        let built = self.services.build_adapter((*config).clone());
        self.config.store(config);
        match built {
            Ok(adapter) => {
                debug!(gateway = %self.name, provider = %adapter.kind(), "Model gateway ready");
                self.slot.store(Arc::new(AdapterSlot::Ready(adapter)));
                Ok(())
            }
            Err(e) => {
                error!(gateway = %self.name, error = %e, "Adapter construction failed, gateway degraded");
                self.slot.store(Arc::new(AdapterSlot::Degraded(e.to_string())));
                Err(e)
            }
        }
    }

    /// The live adapter
    ///
    /// # Errors
    /// Returns a configuration error unless the gateway is ready.
    pub fn adapter(&self) -> GatewayResult<Arc<dyn ProviderAdapter>> {
        match &**self.slot.load() {
            AdapterSlot::Ready(adapter) => Ok(Arc::clone(adapter)),
            AdapterSlot::Degraded(reason) => Err(GatewayError::configuration(format!(
                "model gateway '{}' is not initialized: {reason}",
                self.name
            ))),
            AdapterSlot::Uninitialized | AdapterSlot::Initializing => Err(GatewayError::configuration(format!(
                "model gateway '{}' is not initialized",
                self.name
            ))),
        }
    }

    fn ready_adapter(&self) -> GatewayResult<Arc<dyn ProviderAdapter>> {
        let adapter = self.adapter()?;
        if !adapter.config().has_api_key() {
            warn!(gateway = %self.name, provider = %adapter.kind(), "Call rejected, API key is not configured");
            return Err(GatewayError::configuration(format!(
                "API key is not configured for model '{}'",
                self.name
            )));
        }
        Ok(adapter)
    }

    /// Unary generation with retry under the unary deadline
    ///
    /// # Errors
    /// Returns the final error after retries, a timeout error when the
    /// deadline passes, or a configuration error without contacting the
    /// vendor when the gateway is unusable or has no API key.
    pub async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GenerationResponse> {
        self.generate_report(request).await.result
    }

    /// Unary generation, reporting retries and duration
    pub async fn generate_report(&self, request: &GenerationRequest) -> GenerateReport {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let result = self.generate_inner(request, &attempts).await;
        GenerateReport {
            result,
            retries: attempts.load(Ordering::SeqCst).saturating_sub(1),
            duration: started.elapsed(),
        }
    }

    async fn generate_inner(&self, request: &GenerationRequest, attempts: &AtomicU32) -> GatewayResult<GenerationResponse> {
        let adapter = self.ready_adapter()?;
        let provider = adapter.kind();
        let model = adapter.model().to_string();
        let correlation_id = request.metadata().correlation_id.clone();
        let span = gateway_call_span!(correlation_id, provider, model, "generate");

        async {
            let trace = self.services.traces().start(provider, &model, request, false);
            let timeout = self.services.generate_timeout();
            let call = self.services.retry().run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let adapter = Arc::clone(&adapter);
                async move { adapter.generate(request).await?.into_result(provider.as_str()) }
            });

            let result = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome.into_result(),
                Err(_) => Err(GatewayError::timeout(timeout)),
            };

            match &result {
                Ok(response) => {
                    trace.record_response(response);
                    info!(
                        finish_reason = %response.finish_reason,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        tool_calls = response.tool_calls.len(),
                        "Generation successful"
                    );
                }
                Err(e) => {
                    trace.record_error(e);
                    error!(error = %e, error_type = e.type_tag(), "Generation failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Streaming generation through the merged pipeline.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns a configuration error without contacting the vendor when the
    /// gateway is unusable or has no API key. Later failures arrive as the
    /// stream's terminal `Error` event.
    pub fn generate_stream(&self, request: &GenerationRequest) -> GatewayResult<GatewayStream> {
        let adapter = self.ready_adapter()?;
        let provider = adapter.kind();
        let model = adapter.model().to_string();
        let correlation_id = request.metadata().correlation_id.clone();

        let trace = self.services.traces().start(provider, &model, request, true);
        let observer = Arc::new(TraceObserver::new(trace, provider, model.clone(), correlation_id.clone()));

        let request = Arc::new(request.clone());
        let open = move || {
            let adapter = Arc::clone(&adapter);
            let request = Arc::clone(&request);
            async move { adapter.generate_stream(&request).await }
        };

        debug!(correlation_id = %correlation_id, provider = %provider, model = %model, "Starting stream");
        Ok(self.services.pipeline().start(provider, open, observer))
    }

    /// Estimated cost of a request
    #[must_use]
    pub fn estimate(&self, request: &GenerationRequest) -> CostEstimate {
        let config = self.config.load();
        self.services.cost().estimate(config.provider, &config.model, request)
    }

    /// Estimated cost of a request in the display currency. Never fails.
    #[must_use]
    pub fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        self.estimate(request).amount
    }

    /// Model catalog using the configured credentials
    ///
    /// # Errors
    /// See [`ModelGateway::list_models_with_api_key`].
    pub async fn list_models(&self) -> GatewayResult<Vec<ModelInfo>> {
        let config = self.config.load_full();
        self.list_models_with_api_key(&config.api_key, config.endpoint.as_deref())
            .await
    }

    /// Model catalog using explicit credentials, served from the catalog
    /// cache while fresh
    ///
    /// # Errors
    /// Returns a configuration error for a blank key or an unusable gateway,
    /// or the vendor error after retries.
    pub async fn list_models_with_api_key(
        &self,
        api_key: &SecretString,
        endpoint: Option<&str>,
    ) -> GatewayResult<Vec<ModelInfo>> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::configuration("an API key is required to list models"));
        }
        let adapter = self.adapter()?;
        let provider = adapter.kind();
        let catalog = self.services.catalog();

        if let Some(models) = catalog.get(provider, endpoint, api_key.expose_secret()) {
            debug!(gateway = %self.name, provider = %provider, models = models.len(), "Model catalog cache hit");
            return Ok(models.as_ref().clone());
        }

        let timeout = self.services.generate_timeout();
        let fetch = self
            .services
            .retry()
            .execute(|| adapter.list_models_with_api_key(api_key, endpoint));
        let models = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| GatewayError::timeout(timeout))??;
        let models = self.priced(provider, models);

        info!(gateway = %self.name, provider = %provider, models = models.len(), "Model catalog fetched");
        Ok(catalog
            .insert(provider, endpoint, api_key.expose_secret(), models)
            .as_ref()
            .clone())
    }

    /// Fill missing catalog prices from the price table
    fn priced(&self, provider: ProviderKind, models: Vec<ModelInfo>) -> Vec<ModelInfo> {
        let cost = self.services.cost();
        models
            .into_iter()
            .map(|info| {
                if info.input_price_per_1k.is_some() && info.output_price_per_1k.is_some() {
                    return info;
                }
                let pricing = cost.price(provider, &info.id);
                info.with_pricing(pricing.input_cost_per_1k, pricing.output_cost_per_1k)
            })
            .collect()
    }

    /// Drop cached catalogs of this gateway's vendor
    pub fn invalidate_models(&self) {
        self.services.catalog().invalidate(self.provider());
    }

    /// Probe the vendor with one minimal call. Any failure is `false`.
    pub async fn validate_api_key(&self) -> bool {
        let Ok(adapter) = self.ready_adapter() else {
            return false;
        };
        let valid = tokio::time::timeout(self.services.generate_timeout(), adapter.validate_api_key())
            .await
            .unwrap_or(false);
        info!(gateway = %self.name, provider = %adapter.kind(), valid, "API key validated");
        valid
    }
}

impl fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelGateway")
            .field("name", &self.name)
            .field("provider", &self.provider())
            .field("model", &self.model())
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}
