//! Retry policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serde_duration::duration_millis;

/// Invalid reliability settings
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PolicyError {
    /// Backoff coefficient below 1 (or not a number)
    #[error("backoff coefficient must be a finite number >= 1, got {0}")]
    InvalidBackoffCoefficient(f64),

    /// A timeout that would expire immediately
    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Configuration for activity retries
///
/// The delay after failed attempt `n` (1-based) is
/// `min(initial_interval * backoff_coefficient^(n-1), max_interval)`.
/// No jitter is applied, so a schedule is fully determined by the policy.
///
/// # Example
///
/// ```
/// use weft_durable::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_secs(1))
///     .with_max_interval(Duration::from_secs(60));
///
/// assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
/// assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
/// assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (0 = unlimited)
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between attempts
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (>= 1; 1 means fixed intervals)
    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Create an exponential backoff retry policy
    ///
    /// - 3 max attempts
    /// - 1 second initial interval
    /// - 60 second max interval
    /// - 2x backoff coefficient
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
        }
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
        }
    }

    /// Create an exponential policy without an attempt cap
    ///
    /// Only cancellation or a workflow timeout stops such a policy.
    pub fn unlimited() -> Self {
        Self::exponential().with_max_attempts(0)
    }

    /// Set the maximum number of attempts (0 = unlimited)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial retry interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff coefficient (values below 1 are raised to 1)
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = if coefficient.is_nan() {
            1.0
        } else {
            coefficient.max(1.0)
        };
        self
    }

    /// Whether the policy places no cap on attempts
    pub fn is_unlimited(&self) -> bool {
        self.max_attempts == 0
    }

    /// Calculate the delay after a failed attempt (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);

        if !base.is_finite() || base > self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(base.max(0.0))
        }
    }

    /// Check if another attempt may follow the given one
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        self.is_unlimited() || current_attempt < self.max_attempts
    }

    /// Check the policy invariants
    ///
    /// Deserialized policies bypass the builder, so callers accepting
    /// external configuration must validate it.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.backoff_coefficient.is_finite() || self.backoff_coefficient < 1.0 {
            return Err(PolicyError::InvalidBackoffCoefficient(
                self.backoff_coefficient,
            ));
        }
        Ok(())
    }
}
