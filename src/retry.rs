//! Requeue timing for reconcile outcomes
//!
//! Two curves are kept apart on purpose:
//! - a driver that is converging but not ready is re-checked after a fixed
//!   delay, no matter how many times in a row that happened;
//! - a failed pass backs off exponentially per request, from
//!   [`RetryConfig::initial_delay`] up to [`RetryConfig::max_delay`], and the
//!   failure count resets on the next pass that does not fail.
//!
//! [`retry_with_backoff`] applies the same curve inline to one-shot startup
//! calls.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::controller::ReconcileAction;
use crate::{Error, DEFAULT_MAX_RETRY_DELAY, DEFAULT_MIN_RETRY_DELAY};

/// Configuration for exponential failure backoff
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts for [`retry_with_backoff`] (0 = infinite)
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: DEFAULT_MIN_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Create a config bounded by the given min/max delays
    pub fn bounded(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Delay to wait after `failures` previous consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// How a reconcile pass ended, as far as requeue timing is concerned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeClass {
    /// Converged; nothing left to do until something changes
    Success,
    /// Converging; check again after the fixed delay
    NotReady,
    /// Failed; back off exponentially
    Error,
}

impl OutcomeClass {
    /// Classify a reconcile result
    pub fn of(result: &Result<ReconcileAction, Error>) -> Self {
        match result {
            Ok(ReconcileAction::Done) => Self::Success,
            Ok(ReconcileAction::RequeueAfter(_)) => Self::NotReady,
            Err(_) => Self::Error,
        }
    }
}

/// Decides when a request is attempted again
///
/// Failure counts are tracked per key. Successful passes consult
/// [`schedule`](Self::schedule); the controller's error policy calls
/// [`backoff`](Self::backoff) directly.
pub struct RetryScheduler<K> {
    config: RetryConfig,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Clone + Eq + Hash> RetryScheduler<K> {
    /// Create a scheduler with the given backoff bounds
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next attempt for `key`, or `None` to stop requeueing
    pub fn schedule(&self, key: &K, result: &Result<ReconcileAction, Error>) -> Option<Duration> {
        match result {
            Ok(ReconcileAction::Done) => {
                self.forget(key);
                None
            }
            Ok(ReconcileAction::RequeueAfter(delay)) => {
                self.forget(key);
                Some(*delay)
            }
            Err(_) => Some(self.backoff(key)),
        }
    }

    /// Record a failure for `key` and return how long to wait
    pub fn backoff(&self, key: &K) -> Duration {
        let mut failures = self.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let delay = self.config.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Reset the failure count for `key`
    pub fn forget(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Number of consecutive failures recorded for `key`
    pub fn failures(&self, key: &K) -> u32 {
        self.lock().get(key).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, u32>> {
        // Counters stay consistent even if a holder panicked
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Call `operation` until it succeeds, sleeping [`RetryConfig::delay_for`]
/// between failures.
///
/// Gives up with the last error once `max_attempts` calls have failed, unless
/// `max_attempts` is 0.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = config.delay_for(attempt - 1);
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                debug!(operation = %operation_name, "retrying");
            }
        }
    }
}
