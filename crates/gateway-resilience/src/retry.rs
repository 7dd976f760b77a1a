//! Bounded retry for vendor calls.
//!
//! Delays grow geometrically from `base_delay` up to `max_delay` and are
//! spread by a symmetric jitter factor. Rate-limited faults wait
//! `rate_limit_factor` times longer, or as long as the vendor asked.
//! Faults classified [`FaultClass::Fatal`] end the loop immediately.

use crate::classifier::{classify, FaultClass};
use gateway_core::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff parameters
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound of a single delay, before jitter
    pub max_delay: Duration,
    /// Growth per retry
    pub multiplier: f64,
    /// Relative spread in `0.0..=1.0`
    pub jitter: f64,
    /// Stretch applied to rate-limited faults
    pub rate_limit_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
            rate_limit_factor: 2.0,
        }
    }
}

impl RetryConfig {
    fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self.base_delay.as_nanos() as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_nanos(grown.min(self.max_delay.as_nanos() as f64) as u64)
    }

    fn spread(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor.max(0.0))
    }
}

/// Outcome of [`RetryPolicy::run`]
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result
    pub result: Result<T, GatewayError>,
    /// Retries made after the first attempt
    pub retries: u32,
}

impl<T> RetryOutcome<T> {
    /// Drop the retry count
    ///
    /// # Errors
    /// Returns the last error when no attempt succeeded.
    pub fn into_result(self) -> Result<T, GatewayError> {
        self.result
    }

    /// Retries made after the first attempt
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether some attempt succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Retry policy shared by unary calls, catalog fetches and the stream
/// producer
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Policy with the given parameters
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Parameters of this policy
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Jittered delay before retry number `retry` (0-indexed)
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        self.config.spread(self.config.backoff(retry))
    }

    /// Whether the error may be retried at all
    #[must_use]
    pub fn is_retryable(&self, error: &GatewayError) -> bool {
        classify(error).is_retryable()
    }

    /// Delay before retrying after attempt `attempt` (0-indexed) failed with
    /// `error`, or `None` when the error is fatal or the budget is spent
    #[must_use]
    pub fn next_delay(&self, attempt: u32, error: &GatewayError) -> Option<Duration> {
        if attempt >= self.config.max_retries {
            return None;
        }
        match classify(error) {
            FaultClass::Fatal => None,
            FaultClass::Transient => Some(self.delay_for_attempt(attempt)),
            FaultClass::RateLimited => {
                let stretched = self
                    .delay_for_attempt(attempt)
                    .mul_f64(self.config.rate_limit_factor.max(1.0));
                let requested = match error {
                    GatewayError::RateLimit { retry_after, .. } => *retry_after,
                    _ => None,
                };
                Some(requested.map_or(stretched, |after| stretched.max(after)))
            }
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or the retry budget
    /// is spent
    pub async fn run<F, Fut, T>(&self, operation: F) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut retries = 0;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "Call succeeded after retrying");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        retries,
                    };
                }
                Err(error) => error,
            };

            let Some(delay) = self.next_delay(retries, &error) else {
                return RetryOutcome {
                    result: Err(error),
                    retries,
                };
            };

            warn!(
                attempt = retries + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis(),
                error_type = error.type_tag(),
                error = %error,
                "Vendor call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }

    /// [`run`](Self::run) without the retry count
    ///
    /// # Errors
    /// Returns the last error when no attempt succeeded.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.run(operation).await.result
    }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    config: RetryConfig,
}

impl RetryPolicyBuilder {
    /// Start from the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries after the first attempt
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Delay before the first retry
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.config.base_delay = base_delay;
        self
    }

    /// Delay cap
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = max_delay;
        self
    }

    /// Growth per retry
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Jitter, clamped to `0.0..=1.0`
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Stretch for rate-limited faults
    #[must_use]
    pub fn rate_limit_factor(mut self, factor: f64) -> Self {
        self.config.rate_limit_factor = factor;
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::new(self.config)
    }
}
