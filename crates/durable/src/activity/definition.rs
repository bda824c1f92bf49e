//! Activity trait definition

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ActivityContext;
use crate::reliability::TimeoutType;

/// Error type set on failures caused by a cancelled attempt
pub const CANCELLED_ERROR_TYPE: &str = "CANCELLED";

/// Error type set when an activity input cannot be decoded
pub const INVALID_INPUT_ERROR_TYPE: &str = "INVALID_INPUT";

/// How the engine must treat a failed activity attempt
///
/// The classification is explicit: the engine never inspects the error
/// message to decide whether an attempt may be retried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Eligible for retry under the activity's retry policy
    Transient,

    /// Business failure; propagated immediately without further attempts
    Permanent,
}

/// Error type for activity failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    /// Retry classification
    pub kind: ErrorKind,

    /// Error message
    pub message: String,

    /// Error type/code for programmatic handling
    pub error_type: Option<String>,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl ActivityError {
    /// Create a transient (retryable) error
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
            error_type: None,
            details: None,
        }
    }

    /// Create a permanent (non-retryable) error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
            error_type: None,
            details: None,
        }
    }

    /// Create the transient error reported when an attempt exceeds a deadline
    pub fn timed_out(timeout_type: TimeoutType, limit: Duration) -> Self {
        Self::transient(format!("{timeout_type} timeout of {limit:?} exceeded"))
            .with_type(timeout_type.error_type())
            .with_details(serde_json::json!({
                "limit_ms": u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }))
    }

    /// Set the error type
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether the retry governor may attempt the activity again
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// The deadline this error reports, if it was produced by a timeout
    pub fn timeout_type(&self) -> Option<TimeoutType> {
        self.error_type.as_deref().and_then(TimeoutType::from_error_type)
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::transient(format!("{err:#}"))
    }
}

/// An activity is a unit of work that may fail and be retried
///
/// Activities are the only place where a workflow touches the outside
/// world. They:
/// - Receive a fully self-contained input
/// - May take a long time and report liveness through heartbeats
/// - Fail with an explicit [`ErrorKind`]
///
/// # Example
///
/// ```ignore
/// use weft_durable::prelude::*;
///
/// struct SendEmailActivity;
///
/// #[async_trait]
/// impl Activity for SendEmailActivity {
///     const TYPE: &'static str = "send_email";
///     type Input = SendEmailInput;
///     type Output = SendEmailOutput;
///
///     async fn execute(
///         &self,
///         ctx: &ActivityContext,
///         input: Self::Input,
///     ) -> Result<Self::Output, ActivityError> {
///         ctx.heartbeat(None)?;
///         Ok(SendEmailOutput { message_id: "..." })
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Unique type identifier for this activity
    ///
    /// This is the name the activity is registered and dispatched under.
    const TYPE: &'static str;

    /// Input type for the activity
    type Input: Serialize + DeserializeOwned + Send + 'static;

    /// Output type for the activity
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Execute the activity
    ///
    /// # Errors
    ///
    /// Return `ActivityError::transient()` for failures that should be retried.
    /// Return `ActivityError::permanent()` for failures that must not be.
    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_error_transient() {
        let error = ActivityError::transient("connection reset");
        assert!(error.is_retryable());
        assert_eq!(error.kind, ErrorKind::Transient);
        assert_eq!(error.to_string(), "connection reset");
    }

    #[test]
    fn test_activity_error_permanent() {
        let error = ActivityError::permanent("invalid account");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_timed_out_is_transient_and_typed() {
        let error = ActivityError::timed_out(TimeoutType::Heartbeat, Duration::from_millis(250));

        assert!(error.is_retryable());
        assert_eq!(error.timeout_type(), Some(TimeoutType::Heartbeat));
        assert_eq!(error.details, Some(serde_json::json!({"limit_ms": 250})));
    }

    #[test]
    fn test_anyhow_conversion_is_transient() {
        let error: ActivityError = anyhow::anyhow!("upstream unavailable").into();
        assert!(error.is_retryable());
        assert!(error.timeout_type().is_none());
    }

    #[test]
    fn test_activity_error_serialization() {
        let error = ActivityError::permanent("test error")
            .with_type("TEST")
            .with_details(serde_json::json!({"key": "value"}));

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "permanent");

        let parsed: ActivityError = serde_json::from_value(json).unwrap();
        assert_eq!(error, parsed);
    }
}
