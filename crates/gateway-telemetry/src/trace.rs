//! Call tracing.
//!
//! Every gateway call produces one [`Trace`]: opened when the call starts,
//! finalized exactly once with a response, an error or a cancellation.
//! Persistence goes through a [`TraceStore`] on a spawned task so a slow or
//! failing store never affects the call itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::{
    Completion, CorrelationId, FinishReason, GatewayError, GenerationRequest, GenerationResponse,
    Message, Parameters, ProviderKind, TokenUsage, ToolCallRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trace store errors
#[derive(Debug, Error)]
pub enum TraceStoreError {
    /// A terminal trace cannot be overwritten
    #[error("trace {0} is already finalized")]
    AlreadyFinalized(Uuid),

    /// Backend failure
    #[error("trace store unavailable: {0}")]
    Unavailable(String),
}

/// Request as it was sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// System prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Conversation
    pub messages: Vec<Message>,
    /// Parameters, vendor options included verbatim
    pub parameters: Parameters,
}

impl From<&GenerationRequest> for RequestSnapshot {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            system_prompt: request.system_prompt().map(str::to_string),
            messages: request.messages().to_vec(),
            parameters: request.parameters().clone(),
        }
    }
}

/// Successful result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// Generated text
    pub content: String,
    /// Requested tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: FinishReason,
}

/// Failed result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    /// Display-safe message
    pub message: String,
    /// Error type tag
    pub error_type: String,
    /// Full diagnostic text
    pub detail: String,
}

impl From<&GatewayError> for ErrorSnapshot {
    fn from(error: &GatewayError) -> Self {
        Self {
            message: error.user_message(),
            error_type: error.type_tag().to_string(),
            detail: error.to_string(),
        }
    }
}

/// How a call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// Completed with a result
    Success(ResponseSnapshot),
    /// Failed
    Error(ErrorSnapshot),
    /// Cancelled by the caller
    Cancelled,
}

/// One gateway call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Trace id
    pub id: Uuid,
    /// Correlation id of the call
    pub correlation_id: CorrelationId,
    /// Calling user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Business feature tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_tag: Option<String>,
    /// Vendor
    pub provider: ProviderKind,
    /// Model
    pub model: String,
    /// Streaming call
    pub streaming: bool,
    /// Request snapshot
    pub request: RequestSnapshot,
    /// Outcome, absent while the call runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TraceOutcome>,
    /// Time to first content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_token_ms: Option<u64>,
    /// Total duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Start time
    pub created_at: DateTime<Utc>,
    /// End time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trace {
    /// Open a trace for a request
    #[must_use]
    pub fn open(provider: ProviderKind, model: impl Into<String>, request: &GenerationRequest, streaming: bool) -> Self {
        let metadata = request.metadata();
        Self {
            id: Uuid::new_v4(),
            correlation_id: metadata.correlation_id.clone(),
            user_id: metadata.user_id.clone(),
            session_id: metadata.session_id.clone(),
            business_tag: metadata.business_tag.clone(),
            provider,
            model: model.into(),
            streaming,
            request: RequestSnapshot::from(request),
            outcome: None,
            first_token_ms: None,
            duration_ms: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Whether the trace has an outcome
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Token usage, zero unless the call succeeded
    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        match &self.outcome {
            Some(TraceOutcome::Success(response)) => response.usage,
            _ => TokenUsage::default(),
        }
    }

    fn status(&self) -> &'static str {
        match self.outcome {
            None => "pending",
            Some(TraceOutcome::Success(_)) => "success",
            Some(TraceOutcome::Error(_)) => "error",
            Some(TraceOutcome::Cancelled) => "cancelled",
        }
    }
}

/// Trace filter
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    /// Calling user
    pub user_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
    /// Business tag
    pub business_tag: Option<String>,
    /// Vendor
    pub provider: Option<ProviderKind>,
    /// Maximum results, newest first
    pub limit: Option<usize>,
}

impl TraceQuery {
    /// Traces of one user within `[from, to)`
    #[must_use]
    pub fn for_user(user_id: impl Into<String>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    /// Restrict to a business tag
    #[must_use]
    pub fn business_tag(mut self, tag: impl Into<String>) -> Self {
        self.business_tag = Some(tag.into());
        self
    }

    /// Restrict to a vendor
    #[must_use]
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Cap the number of results
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a trace matches every set filter
    #[must_use]
    pub fn matches(&self, trace: &Trace) -> bool {
        self.user_id.as_ref().map_or(true, |u| trace.user_id.as_ref() == Some(u))
            && self.from.map_or(true, |from| trace.created_at >= from)
            && self.to.map_or(true, |to| trace.created_at < to)
            && self
                .business_tag
                .as_ref()
                .map_or(true, |t| trace.business_tag.as_ref() == Some(t))
            && self.provider.map_or(true, |p| trace.provider == p)
    }
}

/// Aggregated usage over a set of traces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Calls
    pub calls: u64,
    /// Successful calls
    pub succeeded: u64,
    /// Failed calls
    pub failed: u64,
    /// Cancelled calls
    pub cancelled: u64,
    /// Token usage summed over successful calls
    pub usage: TokenUsage,
}

impl UsageTotals {
    fn add(&mut self, trace: &Trace) {
        self.calls += 1;
        match trace.outcome {
            Some(TraceOutcome::Success(_)) => self.succeeded += 1,
            Some(TraceOutcome::Error(_)) => self.failed += 1,
            Some(TraceOutcome::Cancelled) => self.cancelled += 1,
            None => {}
        }
        self.usage.add(&trace.usage());
    }
}

/// Sum usage over traces
#[must_use]
pub fn usage_totals(traces: &[Trace]) -> UsageTotals {
    let mut totals = UsageTotals::default();
    for trace in traces {
        totals.add(trace);
    }
    totals
}

/// Usage per business tag; untagged calls are grouped under `""`
#[must_use]
pub fn group_by_business_tag(traces: &[Trace]) -> BTreeMap<String, UsageTotals> {
    let mut groups: BTreeMap<String, UsageTotals> = BTreeMap::new();
    for trace in traces {
        groups
            .entry(trace.business_tag.clone().unwrap_or_default())
            .or_default()
            .add(trace);
    }
    groups
}

/// Trace persistence
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Insert or update a trace. Terminal traces are write-once.
    async fn save(&self, trace: Trace) -> Result<(), TraceStoreError>;

    /// Fetch one trace
    async fn get(&self, id: Uuid) -> Result<Option<Trace>, TraceStoreError>;

    /// Traces matching a query, newest first
    async fn query(&self, query: &TraceQuery) -> Result<Vec<Trace>, TraceStoreError>;
}

/// Default in-memory capacity
pub const DEFAULT_TRACE_CAPACITY: usize = 10_000;

#[derive(Default)]
struct TraceBuffer {
    traces: HashMap<Uuid, Trace>,
    order: VecDeque<Uuid>,
}

/// Bounded in-memory store. The oldest trace is evicted at capacity.
pub struct InMemoryTraceStore {
    buffer: RwLock<TraceBuffer>,
    capacity: usize,
}

impl InMemoryTraceStore {
    /// Create a store holding at most `capacity` traces
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(TraceBuffer::default()),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored traces
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.read().order.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTraceStore {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAPACITY)
    }
}

#[async_trait]
impl TraceStore for InMemoryTraceStore {
    async fn save(&self, trace: Trace) -> Result<(), TraceStoreError> {
        let mut buffer = self.buffer.write();

        if let Some(existing) = buffer.traces.get_mut(&trace.id) {
            if existing.is_terminal() {
                return Err(TraceStoreError::AlreadyFinalized(trace.id));
            }
            *existing = trace;
            return Ok(());
        }

        while buffer.order.len() >= self.capacity {
            if let Some(oldest) = buffer.order.pop_front() {
                buffer.traces.remove(&oldest);
            }
        }
        buffer.order.push_back(trace.id);
        buffer.traces.insert(trace.id, trace);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Trace>, TraceStoreError> {
        Ok(self.buffer.read().traces.get(&id).cloned())
    }

    async fn query(&self, query: &TraceQuery) -> Result<Vec<Trace>, TraceStoreError> {
        let buffer = self.buffer.read();
        let matching = buffer
            .order
            .iter()
            .rev()
            .filter_map(|id| buffer.traces.get(id))
            .filter(|trace| query.matches(trace))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }
}

/// Trace recorder configuration
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Whether traces are recorded
    pub enabled: bool,
    /// In-memory capacity
    pub capacity: usize,
    /// Log finalized traces under the `trace` target
    pub log_traces: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_TRACE_CAPACITY,
            log_traces: true,
        }
    }
}

/// Opens traces and hands out their finalization handles
#[derive(Clone)]
pub struct TraceRecorder {
    store: Arc<dyn TraceStore>,
    config: TraceConfig,
}

impl TraceRecorder {
    /// Create a recorder over a store
    #[must_use]
    pub fn new(store: Arc<dyn TraceStore>, config: TraceConfig) -> Self {
        Self { store, config }
    }

    /// Recorder over a bounded in-memory store
    #[must_use]
    pub fn in_memory(config: TraceConfig) -> Self {
        let store = Arc::new(InMemoryTraceStore::new(config.capacity));
        Self::new(store, config)
    }

    /// A recorder that records nothing
    #[must_use]
    pub fn disabled() -> Self {
        Self::in_memory(TraceConfig {
            enabled: false,
            capacity: 1,
            log_traces: false,
        })
    }

    /// Whether traces are recorded
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TraceStore> {
        &self.store
    }

    /// Open a trace for a call
    #[must_use]
    pub fn start(&self, provider: ProviderKind, model: &str, request: &GenerationRequest, streaming: bool) -> TraceHandle {
        let trace = Trace::open(provider, model, request, streaming);
        debug!(
            trace_id = %trace.id,
            correlation_id = %trace.correlation_id,
            provider = %provider,
            model = %model,
            streaming,
            "Trace opened"
        );
        let handle = TraceHandle {
            inner: Arc::new(HandleInner {
                trace: Mutex::new(Some(trace.clone())),
                started: Instant::now(),
                first_token: Mutex::new(None),
                store: Arc::clone(&self.store),
                config: self.config.clone(),
            }),
        };
        handle.inner.persist(trace);
        handle
    }

    /// Traces matching a query
    ///
    /// # Errors
    /// Returns the store's error.
    pub async fn query(&self, query: &TraceQuery) -> Result<Vec<Trace>, TraceStoreError> {
        self.store.query(query).await
    }

    /// Aggregated usage of the traces matching a query
    ///
    /// # Errors
    /// Returns the store's error.
    pub async fn usage_totals(&self, query: &TraceQuery) -> Result<UsageTotals, TraceStoreError> {
        Ok(usage_totals(&self.store.query(query).await?))
    }

    /// Usage per business tag of the traces matching a query
    ///
    /// # Errors
    /// Returns the store's error.
    pub async fn group_by_business_tag(
        &self,
        query: &TraceQuery,
    ) -> Result<BTreeMap<String, UsageTotals>, TraceStoreError> {
        Ok(group_by_business_tag(&self.store.query(query).await?))
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder").field("config", &self.config).finish_non_exhaustive()
    }
}

struct HandleInner {
    /// `None` once finalized
    trace: Mutex<Option<Trace>>,
    started: Instant,
    first_token: Mutex<Option<Duration>>,
    store: Arc<dyn TraceStore>,
    config: TraceConfig,
}

impl HandleInner {
    fn persist(&self, trace: Trace) {
        if !self.config.enabled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(trace_id = %trace.id, "No runtime available, trace dropped");
            return;
        };
        let store = Arc::clone(&self.store);
        runtime.spawn(async move {
            let id = trace.id;
            if let Err(e) = store.save(trace).await {
                warn!(trace_id = %id, error = %e, "Failed to persist trace");
            }
        });
    }

    fn finalize(&self, outcome: TraceOutcome) -> bool {
        let Some(mut trace) = self.trace.lock().take() else {
            return false;
        };

        let elapsed = self.started.elapsed();
        trace.outcome = Some(outcome);
        trace.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        trace.first_token_ms = self
            .first_token
            .lock()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        trace.finished_at = Some(Utc::now());

        if self.config.log_traces {
            let usage = trace.usage();
            info!(
                target: "trace",
                trace_id = %trace.id,
                correlation_id = %trace.correlation_id,
                provider = %trace.provider,
                model = %trace.model,
                status = trace.status(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                duration_ms = trace.duration_ms,
                first_token_ms = trace.first_token_ms,
                "Call finished"
            );
        }

        self.persist(trace);
        true
    }
}

/// Finalization handle of one open trace. Clones share the same trace; the
/// first terminal record wins and later ones are ignored.
#[derive(Clone)]
pub struct TraceHandle {
    inner: Arc<HandleInner>,
}

impl TraceHandle {
    /// Note the first content delta. Only the first call counts.
    pub fn mark_first_token(&self) {
        let mut first = self.inner.first_token.lock();
        if first.is_none() {
            *first = Some(self.inner.started.elapsed());
        }
    }

    /// Whether a terminal record was already written
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.inner.trace.lock().is_none()
    }

    /// Record a unary response. Returns `false` if already finalized.
    pub fn record_response(&self, response: &GenerationResponse) -> bool {
        self.inner.finalize(TraceOutcome::Success(ResponseSnapshot {
            content: response.content.clone(),
            tool_calls: response.tool_calls.clone(),
            usage: response.usage,
            finish_reason: response.finish_reason,
        }))
    }

    /// Record a completed stream. Returns `false` if already finalized.
    pub fn record_completion(&self, completion: &Completion) -> bool {
        self.inner.finalize(TraceOutcome::Success(ResponseSnapshot {
            content: completion.content.clone(),
            tool_calls: completion.tool_calls.clone(),
            usage: completion.usage,
            finish_reason: completion.finish_reason,
        }))
    }

    /// Record a failure. Returns `false` if already finalized.
    pub fn record_error(&self, error: &GatewayError) -> bool {
        self.inner.finalize(TraceOutcome::Error(ErrorSnapshot::from(error)))
    }

    /// Record a cancellation. Returns `false` if already finalized.
    pub fn record_cancelled(&self) -> bool {
        self.inner.finalize(TraceOutcome::Cancelled)
    }
}

impl std::fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHandle")
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}
