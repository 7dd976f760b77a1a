//! Stream observer that finalizes the call trace and logs the outcome.

use gateway_core::{Completion, CorrelationId, GatewayError, ProviderKind};
use gateway_streaming::StreamObserver;
use gateway_telemetry::TraceHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub(crate) struct TraceObserver {
    trace: TraceHandle,
    provider: ProviderKind,
    model: String,
    correlation_id: CorrelationId,
    started: Instant,
}

impl TraceObserver {
    pub(crate) fn new(
        trace: TraceHandle,
        provider: ProviderKind,
        model: String,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            trace,
            provider,
            model,
            correlation_id,
            started: Instant::now(),
        }
    }
}

impl StreamObserver for TraceObserver {
    fn on_first_token(&self) {
        self.trace.mark_first_token();
        debug!(
            correlation_id = %self.correlation_id,
            provider = %self.provider,
            first_token_ms = self.started.elapsed().as_millis(),
            "First token"
        );
    }

    fn on_retry(&self, attempt: u32, error: &GatewayError) {
        warn!(
            correlation_id = %self.correlation_id,
            provider = %self.provider,
            attempt,
            error_type = error.type_tag(),
            "Stream attempt failed"
        );
    }

    fn on_complete(&self, completion: &Completion) {
        self.trace.record_completion(completion);
        info!(
            correlation_id = %self.correlation_id,
            provider = %self.provider,
            model = %self.model,
            duration_ms = self.started.elapsed().as_millis(),
            output_tokens = completion.usage.output_tokens,
            "Streaming generation successful"
        );
    }

    fn on_error(&self, err: &GatewayError) {
        self.trace.record_error(err);
        error!(
            correlation_id = %self.correlation_id,
            provider = %self.provider,
            model = %self.model,
            error = %err,
            "Streaming generation failed"
        );
    }

    fn on_cancelled(&self) {
        if self.trace.record_cancelled() {
            info!(
                correlation_id = %self.correlation_id,
                provider = %self.provider,
                "Streaming generation cancelled"
            );
        }
    }
}
