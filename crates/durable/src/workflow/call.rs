//! Activity calls issued by workflows and the results they produce

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::WorkflowError;
use crate::activity::Activity;
use crate::reliability::{RetryPolicy, TimeoutConfig};

/// Options for activity execution
///
/// Overrides the engine-wide defaults for a single call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    /// Retry policy for this activity
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Per-attempt deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl ActivityOptions {
    /// Set the retry policy
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Set the timeouts
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// A request from a workflow to run one activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityCall {
    /// Registered activity type to dispatch
    pub activity_type: String,

    /// JSON input handed to the activity
    pub input: serde_json::Value,

    /// Per-call options (None = engine defaults)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ActivityOptions>,
}

impl ActivityCall {
    /// Create a call from an activity type name and raw input
    pub fn new(activity_type: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            activity_type: activity_type.into(),
            input,
            options: None,
        }
    }

    /// Create a call to `A` with a typed input
    pub fn of<A: Activity>(input: &A::Input) -> Result<Self, WorkflowError> {
        let input = serde_json::to_value(input).map_err(|e| {
            WorkflowError::new(format!("failed to encode input for {}: {e}", A::TYPE))
                .with_code("INPUT_ENCODING")
        })?;
        Ok(Self::new(A::TYPE, input))
    }

    /// Override the engine defaults for this call
    pub fn with_options(mut self, options: ActivityOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Informational metadata attached to every activity result
///
/// Never consulted for control flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetadata {
    /// Attempt that produced the value (1-based)
    pub attempts: u32,

    /// When the successful attempt finished
    pub completed_at: DateTime<Utc>,
}

/// Successful outcome of one activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityResult {
    /// Activity ID within the workflow
    pub activity_id: String,

    /// JSON output of the activity
    pub value: serde_json::Value,

    pub metadata: ResultMetadata,
}

impl ActivityResult {
    /// Decode the value into the activity's output type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WorkflowError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            WorkflowError::new(format!(
                "failed to decode result of {}: {e}",
                self.activity_id
            ))
            .with_code("RESULT_DECODING")
        })
    }
}
