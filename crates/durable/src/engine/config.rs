//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::{PolicyError, RetryPolicy, TimeoutConfig};
use crate::serde_duration::option_duration_millis;
use crate::workflow::ActivityOptions;

/// Errors from configuration validation
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("fan-out width must be at least 1")]
    ZeroFanOutWidth,
}

/// Configuration for the orchestration engine
///
/// Passed to [`Orchestrator::new`](super::Orchestrator::new); there is no
/// process-global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Retry policy for activities without their own
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Per-attempt deadlines for activities without their own
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Bound on the total elapsed time of a run (None = unbounded)
    #[serde(default, with = "option_duration_millis")]
    pub workflow_timeout: Option<Duration>,

    /// Width handed to [`Workflow::fan_out`](crate::workflow::Workflow::fan_out)
    pub fan_out_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            workflow_timeout: None,
            fan_out_width: 3,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_workflow_timeout(mut self, timeout: Duration) -> Self {
        self.workflow_timeout = Some(timeout);
        self
    }

    pub fn with_fan_out_width(mut self, width: usize) -> Self {
        self.fan_out_width = width;
        self
    }

    /// Check every invariant of the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_policy.validate()?;
        self.timeouts.validate()?;
        if self.workflow_timeout.is_some_and(|d| d.is_zero()) {
            return Err(PolicyError::ZeroTimeout("workflow").into());
        }
        if self.fan_out_width == 0 {
            return Err(ConfigError::ZeroFanOutWidth);
        }
        Ok(())
    }

    /// Default options for activity calls that carry none
    pub fn activity_options(&self) -> ActivityOptions {
        ActivityOptions {
            retry_policy: self.retry_policy.clone(),
            timeouts: self.timeouts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.retry_policy, RetryPolicy::exponential());
        assert_eq!(config.timeouts.start_to_close, Duration::from_secs(10));
        assert!(config.timeouts.heartbeat.is_none());
        assert!(config.workflow_timeout.is_none());
        assert_eq!(config.fan_out_width, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            EngineConfig::new().with_fan_out_width(0).validate(),
            Err(ConfigError::ZeroFanOutWidth)
        );
        assert_eq!(
            EngineConfig::new()
                .with_workflow_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::Policy(PolicyError::ZeroTimeout("workflow")))
        );
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "fan_out_width": 5,
            "workflow_timeout": 30000
        }))
        .unwrap();

        assert_eq!(config.fan_out_width, 5);
        assert_eq!(config.workflow_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.retry_policy, RetryPolicy::exponential());
    }
}
