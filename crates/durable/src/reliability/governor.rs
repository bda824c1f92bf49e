//! Retry governor
//!
//! Drives the attempts of one activity: runs an attempt, classifies its
//! error, waits out the backoff delay and tries again until the activity
//! succeeds, fails permanently, exhausts its policy or is cancelled.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::RetryPolicy;
use crate::activity::{ActivityError, ActivityFailure};
use crate::serde_duration::millis;

/// A successful value together with the attempt that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,

    /// 1-based number of the successful attempt
    pub attempts: u32,
}

/// Applies a [`RetryPolicy`] to a fallible operation
#[derive(Debug, Clone)]
pub struct RetryGovernor {
    policy: RetryPolicy,
}

impl RetryGovernor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt_fn` until it succeeds or a terminal failure is reached
    ///
    /// `attempt_fn` receives the 1-based attempt number. Transient errors
    /// are retried after [`RetryPolicy::backoff_delay`]; permanent errors
    /// end the loop immediately. Cancelling `cancel` aborts a pending
    /// backoff and turns the failure of an in-flight attempt into
    /// [`ActivityFailure::Cancelled`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<Attempted<T>, ActivityFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ActivityFailure::Cancelled { attempts: attempt });
            }

            attempt = attempt.saturating_add(1);

            let error = match attempt_fn(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            if cancel.is_cancelled() {
                tracing::debug!(attempt, "attempt ended by cancellation");
                return Err(ActivityFailure::Cancelled { attempts: attempt });
            }

            if !error.is_retryable() {
                tracing::debug!(attempt, error = %error, "permanent activity error");
                return Err(ActivityFailure::Permanent {
                    attempts: attempt,
                    error,
                });
            }

            if !self.policy.has_attempts_remaining(attempt) {
                tracing::warn!(attempt, error = %error, "activity retries exhausted");
                return Err(ActivityFailure::RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.backoff_delay(attempt);
            tracing::info!(
                attempt,
                delay_ms = millis(delay),
                error = %error,
                "activity attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "backoff interrupted by cancellation");
                    return Err(ActivityFailure::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
