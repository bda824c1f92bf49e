//! Activity execution context

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::reliability::HeartbeatRecord;

/// Error from heartbeat operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeartbeatError {
    /// The attempt was cancelled (caller abort, timeout or stall)
    #[error("activity was cancelled")]
    Cancelled,
}

/// Context provided to activities during execution
///
/// The context provides:
/// - Information about the current execution attempt
/// - Heartbeat functionality for long-running activities
/// - Cancellation detection
///
/// Each attempt gets a fresh context. The context is the only writer of the
/// attempt's [`HeartbeatRecord`]; the engine's heartbeat monitor is its only
/// reader.
///
/// # Example
///
/// ```ignore
/// async fn execute(&self, ctx: &ActivityContext, input: Input) -> Result<Output, ActivityError> {
///     for chunk in input.chunks {
///         tokio::select! {
///             _ = ctx.cancelled() => {
///                 return Err(ActivityError::transient("cancelled"));
///             }
///             _ = process(chunk) => {}
///         }
///
///         // Report progress and keep the attempt alive
///         ctx.heartbeat(Some(json!({"chunk": chunk.id})))?;
///     }
///
///     Ok(Output { ... })
/// }
/// ```
#[derive(Debug)]
pub struct ActivityContext {
    /// Unique ID of this execution attempt
    pub handle_id: Uuid,

    /// Workflow run that owns this activity
    pub workflow_id: Uuid,

    /// Activity ID within the workflow
    pub activity_id: String,

    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Maximum attempts allowed (0 = unlimited)
    pub max_attempts: u32,

    heartbeat_tx: watch::Sender<HeartbeatRecord>,

    cancellation: CancellationToken,
}

impl ActivityContext {
    /// Create a new activity context
    pub fn new(
        workflow_id: Uuid,
        activity_id: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        let handle_id = Uuid::now_v7();
        let (heartbeat_tx, _) = watch::channel(HeartbeatRecord::new(handle_id));

        Self {
            handle_id,
            workflow_id,
            activity_id: activity_id.into(),
            attempt,
            max_attempts,
            heartbeat_tx,
            cancellation: CancellationToken::new(),
        }
    }

    /// Bind the context to an existing cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Subscribe to this attempt's heartbeat record
    ///
    /// The receiver observes every heartbeat and is closed once the
    /// context is dropped, i.e. when the activity body has finished.
    pub fn heartbeat_receiver(&self) -> watch::Receiver<HeartbeatRecord> {
        self.heartbeat_tx.subscribe()
    }

    /// Record a heartbeat
    ///
    /// Updates the attempt's heartbeat record and returns immediately; it
    /// never blocks and has no effect on the activity's result.
    ///
    /// # Errors
    ///
    /// Returns [`HeartbeatError::Cancelled`] once cancellation was requested,
    /// so activities can bail out with `?`.
    pub fn heartbeat(&self, details: Option<serde_json::Value>) -> Result<(), HeartbeatError> {
        if self.is_cancelled() {
            return Err(HeartbeatError::Cancelled);
        }

        self.heartbeat_tx.send_modify(|record| record.beat(details));
        Ok(())
    }

    /// Snapshot of the most recent heartbeat
    pub fn last_heartbeat(&self) -> HeartbeatRecord {
        self.heartbeat_tx.borrow().clone()
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when cancellation is requested
    ///
    /// Intended for `tokio::select!` inside activity bodies.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// The token cancelled when this attempt must stop
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Check if this is the last retry attempt
    pub fn is_last_attempt(&self) -> bool {
        self.max_attempts != 0 && self.attempt >= self.max_attempts
    }
}

impl From<HeartbeatError> for super::ActivityError {
    fn from(err: HeartbeatError) -> Self {
        Self::transient(err.to_string()).with_type(super::definition::CANCELLED_ERROR_TYPE)
    }
}
