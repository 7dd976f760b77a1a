//! Streaming pipeline.
//!
//! ```text
//!  vendor ChunkStream ──▶ producer task ──▶ content mpsc (bounded) ──┐
//!                                                                    ├─▶ merge ─▶ GatewayStream
//!  heartbeat task ─────────────────────────▶ heartbeat mpsc (1) ─────┘
//! ```
//!
//! Only the producer emits terminal events. The producer stops the heartbeat
//! before it sends one, and the merge ends right after delivering it.

use crate::heartbeat::{spawn_heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use async_stream::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use gateway_core::{
    ChunkStream, Completion, FinishReason, GatewayError, GatewayResult, ProtocolFault,
    ProviderKind, StreamEvent, StreamFailure,
};
use gateway_resilience::RetryPolicy;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Overall deadline of a streaming call
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
    /// Capacity of the content channel
    pub channel_capacity: usize,
    /// Overall deadline, retries included
    pub timeout: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            channel_capacity: 64,
            timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

/// Lifecycle hooks invoked from the producer task.
///
/// Exactly one of `on_complete`, `on_error` or `on_cancelled` is called per
/// stream.
pub trait StreamObserver: Send + Sync {
    /// First content delta produced
    fn on_first_token(&self) {}

    /// A failed attempt is about to be retried
    fn on_retry(&self, _attempt: u32, _error: &GatewayError) {}

    /// Vendor stream finished successfully
    fn on_complete(&self, _completion: &Completion) {}

    /// Stream failed for good
    fn on_error(&self, _error: &GatewayError) {}

    /// Consumer cancelled before any content was produced
    fn on_cancelled(&self) {}
}

/// Observer that ignores every hook
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Builds merged gateway streams from vendor chunk streams
#[derive(Debug, Clone)]
pub struct StreamingPipeline {
    config: StreamingConfig,
    retry: RetryPolicy,
}

impl StreamingPipeline {
    /// Create a pipeline
    #[must_use]
    pub fn new(config: StreamingConfig, retry: RetryPolicy) -> Self {
        Self { config, retry }
    }

    /// Pipeline configuration
    #[must_use]
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Start a stream. `open` is called once per attempt to open the vendor
    /// stream. Must be called within a tokio runtime.
    pub fn start<F, Fut>(&self, provider: ProviderKind, open: F, observer: Arc<dyn StreamObserver>) -> GatewayStream
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatewayResult<ChunkStream>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let heartbeat_stop = cancel.child_token();

        let (content_tx, mut content_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel(1);

        spawn_heartbeat(self.config.heartbeat_interval, heartbeat_tx, heartbeat_stop.clone());

        let producer = Producer {
            provider,
            retry: self.retry.clone(),
            tx: content_tx,
            cancel: cancel.clone(),
            heartbeat_stop,
            observer,
            content_started: false,
            receiver_gone: false,
        };
        tokio::spawn(producer.run(open, self.config.timeout));

        let merge_cancel = cancel.clone();
        let events = stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    event = content_rx.recv() => Merged::Content(event),
                    Some(()) = heartbeat_rx.recv() => Merged::Heartbeat,
                };

                match next {
                    Merged::Heartbeat => yield StreamEvent::Heartbeat,
                    Merged::Content(Some(event)) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Merged::Content(None) => {
                        if !merge_cancel.is_cancelled() {
                            let err = GatewayError::internal("stream producer ended without a terminal event");
                            yield StreamEvent::Error(StreamFailure::from(&err));
                        }
                        break;
                    }
                }
            }
        };

        GatewayStream {
            events: Box::pin(events),
            cancel,
            finished: false,
        }
    }
}

enum Merged {
    Content(Option<StreamEvent>),
    Heartbeat,
}

/// Merged event stream handed to callers.
///
/// Dropping the stream cancels it. Before the first content delta that
/// abandons the vendor call; afterwards the vendor call drains in the
/// background so its outcome is still observed, but nothing more is
/// delivered.
pub struct GatewayStream {
    events: BoxStream<'static, StreamEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl GatewayStream {
    /// Stop the stream. No further events are yielded.
    pub fn cancel(&mut self) {
        self.finished = true;
        self.cancel.cancel();
    }

    /// Whether the stream has ended or was cancelled
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Token that cancels this stream from elsewhere
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for GatewayStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.cancel.is_cancelled() {
            this.finished = true;
            return Poll::Ready(None);
        }
        match this.events.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GatewayStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for GatewayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayStream")
            .field("finished", &self.finished)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

enum Outcome {
    Completed(Completion),
    Failed(GatewayError),
    Cancelled,
}

/// Accumulated state of one attempt
#[derive(Default)]
struct Attempt {
    content: String,
    completion: Completion,
    finish_reason: Option<FinishReason>,
}

struct Producer {
    provider: ProviderKind,
    retry: RetryPolicy,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    heartbeat_stop: CancellationToken,
    observer: Arc<dyn StreamObserver>,
    content_started: bool,
    receiver_gone: bool,
}

impl Producer {
    async fn run<F, Fut>(mut self, open: F, timeout: Duration)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatewayResult<ChunkStream>> + Send + 'static,
    {
        let result = tokio::time::timeout(timeout, self.drive(&open)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(provider = %self.provider, timeout_ms = timeout.as_millis(), "Stream deadline exceeded");
                Outcome::Failed(GatewayError::timeout(timeout))
            }
        };

        self.heartbeat_stop.cancel();
        match outcome {
            Outcome::Completed(completion) => {
                info!(
                    provider = %self.provider,
                    finish_reason = %completion.finish_reason,
                    output_tokens = completion.usage.output_tokens,
                    "Stream completed"
                );
                self.observer.on_complete(&completion);
                self.send(StreamEvent::Complete(completion)).await;
            }
            Outcome::Failed(err) => {
                error!(provider = %self.provider, error = %err, error_type = err.type_tag(), "Stream failed");
                self.observer.on_error(&err);
                self.send(StreamEvent::Error(StreamFailure::from(&err))).await;
            }
            Outcome::Cancelled => {
                debug!(provider = %self.provider, "Stream cancelled before first token");
                self.observer.on_cancelled();
            }
        }
    }

    /// Attempt loop with bounded retry. Retries stop once content was delivered.
    async fn drive<F, Fut>(&mut self, open: &F) -> Outcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GatewayResult<ChunkStream>>,
    {
        let mut attempt = 0;
        loop {
            let err = match self.attempt(open).await {
                Ok(Some(completion)) => return Outcome::Completed(completion),
                Ok(None) => return Outcome::Cancelled,
                Err(err) => err,
            };

            if self.content_started {
                return Outcome::Failed(err);
            }
            let Some(delay) = self.retry.next_delay(attempt, &err) else {
                return Outcome::Failed(err);
            };

            warn!(
                provider = %self.provider,
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                error_type = err.type_tag(),
                error = %err,
                "Retrying stream after error"
            );
            self.observer.on_retry(attempt + 1, &err);

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Outcome::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// One attempt. `Ok(None)` means cancelled before content.
    async fn attempt<F, Fut>(&mut self, open: &F) -> GatewayResult<Option<Completion>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GatewayResult<ChunkStream>>,
    {
        let mut chunks = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(None),
            opened = open() => opened?,
        };

        let mut state = Attempt::default();
        loop {
            let next = if self.content_started {
                // Drain to natural completion regardless of cancellation
                chunks.next().await
            } else {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Ok(None),
                    next = chunks.next() => next,
                }
            };

            let Some(chunk) = next else { break };
            let chunk = chunk?;

            if let Some(delta) = chunk.delta.filter(|d| !d.is_empty()) {
                if !self.content_started {
                    self.content_started = true;
                    self.observer.on_first_token();
                }
                state.content.push_str(&delta);
                self.send(StreamEvent::ContentDelta(delta)).await;
            }
            state.completion.tool_calls.extend(chunk.tool_calls);
            if let Some(reason) = chunk.finish_reason {
                state.finish_reason = Some(reason);
            }
            if let Some(usage) = chunk.usage {
                state.completion.usage = usage;
            }
        }

        let finish_reason = state.finish_reason.unwrap_or(FinishReason::Stop);
        if state.content.trim().is_empty()
            && state.completion.tool_calls.is_empty()
            && !matches!(finish_reason, FinishReason::Length | FinishReason::ContentFilter)
        {
            return Err(GatewayError::protocol(
                self.provider.as_str(),
                ProtocolFault::NoContent,
                "stream completed with neither text nor tool call",
            ));
        }

        state.completion.content = state.content;
        state.completion.finish_reason = finish_reason;
        Ok(Some(state.completion))
    }

    /// Forward an event unless the consumer has cancelled or gone away.
    /// A cancelled consumer never reads again, so a full channel must not
    /// stall the vendor drain.
    async fn send(&mut self, event: StreamEvent) {
        if self.receiver_gone || self.cancel.is_cancelled() {
            return;
        }
        let sent = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(provider = %self.provider, "Stream cancelled, draining vendor stream");
                return;
            }
            sent = self.tx.send(event) => sent,
        };
        if sent.is_err() {
            debug!(provider = %self.provider, "Stream consumer gone, draining vendor stream");
            self.receiver_gone = true;
        }
    }
}
