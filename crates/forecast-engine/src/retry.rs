//! Retry logic with exponential backoff
//!
//! Adapters report failures as values, so the policy inspects the
//! [`ForecastResult`] of each attempt. Only transient failure kinds
//! (`BackendUnavailable`, `Timeout`) are retried; validation outcomes are
//! deterministic and returned after the first attempt.

use forecast_core::{ForecastResult, ModelId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Policy allowing `retries` calls after the first one
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    /// Calculate backoff duration before the given retry
    fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let backoff = self
            .initial_backoff
            .mul_f64(self.backoff_multiplier.powi(exponent).min(f64::from(u32::MAX)));

        backoff.min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent
    ///
    /// The closure receives the 1-based attempt number. The returned result
    /// records how many attempts were made.
    pub async fn execute<F, Fut>(&self, model: &ModelId, mut operation: F) -> ForecastResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ForecastResult>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Attempt {}/{} for model {}", attempt, max_attempts, model);
            let result = operation(attempt).await;

            let Some(kind) = result.failure_kind() else {
                if attempt > 1 {
                    debug!("Model '{}' succeeded after {} retries", model, attempt - 1);
                }
                return result.with_attempts(attempt);
            };

            if !kind.is_retryable() {
                debug!("Model '{}' failed with non-retryable {}", model, kind);
                return result.with_attempts(attempt);
            }

            if attempt >= max_attempts {
                warn!(
                    "Model '{}' failed after {} attempts: {}",
                    model, attempt, kind
                );
                return result.with_attempts(attempt);
            }

            let backoff = self.backoff_duration(attempt);
            warn!(
                "Model '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                model, attempt, max_attempts, kind, backoff
            );
            sleep(backoff).await;
            attempt += 1;
        }
    }
}
