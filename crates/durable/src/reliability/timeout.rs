//! Activity timeout configuration
//!
//! Two deadlines apply to every attempt: the start-to-close timeout, which
//! is always present, and the optional heartbeat timeout, which only
//! applies to activities configured to heartbeat.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PolicyError;
use crate::serde_duration::{duration_millis, option_duration_millis};

/// Types of timeouts that can occur
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    /// Attempt did not complete within start_to_close
    StartToClose,

    /// Attempt did not heartbeat within the heartbeat timeout
    Heartbeat,

    /// Whole workflow exceeded its timeout
    Workflow,
}

impl TimeoutType {
    /// Error type recorded on [`ActivityError`](crate::activity::ActivityError)s
    /// produced by this timeout
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::StartToClose => "START_TO_CLOSE_TIMEOUT",
            Self::Heartbeat => "HEARTBEAT_TIMEOUT",
            Self::Workflow => "WORKFLOW_TIMEOUT",
        }
    }

    /// Inverse of [`TimeoutType::error_type`]
    pub fn from_error_type(error_type: &str) -> Option<Self> {
        match error_type {
            "START_TO_CLOSE_TIMEOUT" => Some(Self::StartToClose),
            "HEARTBEAT_TIMEOUT" => Some(Self::Heartbeat),
            "WORKFLOW_TIMEOUT" => Some(Self::Workflow),
            _ => None,
        }
    }
}

impl fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartToClose => write!(f, "start-to-close"),
            Self::Heartbeat => write!(f, "heartbeat"),
            Self::Workflow => write!(f, "workflow"),
        }
    }
}

/// Timeout configuration for activity attempts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum time for one attempt, from dispatch to completion
    #[serde(with = "duration_millis")]
    pub start_to_close: Duration,

    /// Maximum time between heartbeats (None = no heartbeat required)
    #[serde(default, with = "option_duration_millis")]
    pub heartbeat: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(10),
            heartbeat: None,
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set start-to-close timeout
    pub fn with_start_to_close(mut self, timeout: Duration) -> Self {
        self.start_to_close = timeout;
        self
    }

    /// Set heartbeat timeout
    pub fn with_heartbeat(mut self, timeout: Duration) -> Self {
        self.heartbeat = Some(timeout);
        self
    }

    /// Remove heartbeat timeout
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = None;
        self
    }

    /// Reject deadlines that would expire immediately
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.start_to_close.is_zero() {
            return Err(PolicyError::ZeroTimeout("start-to-close"));
        }
        if self.heartbeat.is_some_and(|d| d.is_zero()) {
            return Err(PolicyError::ZeroTimeout("heartbeat"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_defaults() {
        let config = TimeoutConfig::default();
        assert_eq!(config.start_to_close, Duration::from_secs(10));
        assert!(config.heartbeat.is_none());
    }

    #[test]
    fn test_timeout_config_builder() {
        let config = TimeoutConfig::new()
            .with_start_to_close(Duration::from_secs(600))
            .with_heartbeat(Duration::from_secs(10));

        assert_eq!(config.start_to_close, Duration::from_secs(600));
        assert_eq!(config.heartbeat, Some(Duration::from_secs(10)));
        assert!(config.without_heartbeat().heartbeat.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_deadlines() {
        let config = TimeoutConfig::new().with_start_to_close(Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(PolicyError::ZeroTimeout("start-to-close"))
        );

        let config = TimeoutConfig::new().with_heartbeat(Duration::ZERO);
        assert_eq!(config.validate(), Err(PolicyError::ZeroTimeout("heartbeat")));
    }

    #[test]
    fn test_error_type_round_trip() {
        for timeout_type in [
            TimeoutType::StartToClose,
            TimeoutType::Heartbeat,
            TimeoutType::Workflow,
        ] {
            assert_eq!(
                TimeoutType::from_error_type(timeout_type.error_type()),
                Some(timeout_type)
            );
        }
        assert_eq!(TimeoutType::from_error_type("CANCELLED"), None);
    }

    #[test]
    fn test_missing_heartbeat_deserializes_as_none() {
        let config: TimeoutConfig =
            serde_json::from_value(serde_json::json!({"start_to_close": 2500})).unwrap();

        assert_eq!(config.start_to_close, Duration::from_millis(2500));
        assert!(config.heartbeat.is_none());
    }
}
