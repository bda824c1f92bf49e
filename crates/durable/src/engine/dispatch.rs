//! Activity dispatch
//!
//! Resolves an [`ActivityCall`] against the registry and runs it under the
//! retry governor. Every attempt races three things: the activity body
//! bounded by the start-to-close timeout, the heartbeat monitor (when the
//! activity has a heartbeat deadline) and the caller's cancellation.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::activity::{
    ActivityContext, ActivityError, ActivityFailure, ActivityHandler, ActivityRegistry,
    CANCELLED_ERROR_TYPE,
};
use crate::reliability::{
    HeartbeatMonitor, HeartbeatRecord, ObservedStatus, RetryGovernor, TimeoutType,
};
use crate::workflow::{
    ActivityCall, ActivityOptions, ActivityResult, ResultMetadata, WorkflowError, WorkflowFailure,
};

/// Error type recorded when an activity body panicked
pub const PANICKED_ERROR_TYPE: &str = "PANICKED";

/// An activity call resolved against the registry, ready to dispatch
#[derive(Clone)]
pub struct ScheduledActivity {
    pub activity_id: String,
    pub activity_type: String,
    pub input: Value,

    /// Effective options (call override or engine defaults)
    pub options: ActivityOptions,

    handler: ActivityHandler,
}

impl fmt::Debug for ScheduledActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledActivity")
            .field("activity_id", &self.activity_id)
            .field("activity_type", &self.activity_type)
            .field("input", &self.input)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Dispatches activities of one workflow run
#[derive(Debug, Clone)]
pub struct ActivityDispatcher {
    registry: Arc<ActivityRegistry>,
    defaults: ActivityOptions,
    workflow_id: Uuid,
}

impl ActivityDispatcher {
    pub fn new(
        registry: Arc<ActivityRegistry>,
        defaults: ActivityOptions,
        workflow_id: Uuid,
    ) -> Self {
        Self {
            registry,
            defaults,
            workflow_id,
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// Resolve a call before anything is dispatched
    ///
    /// Unknown activity types and invalid options are validation failures.
    pub fn schedule(
        &self,
        activity_id: impl Into<String>,
        call: ActivityCall,
    ) -> Result<ScheduledActivity, WorkflowFailure> {
        let activity_id = activity_id.into();

        let handler = self.registry.get(&call.activity_type).map_err(|e| {
            WorkflowFailure::Validation {
                error: WorkflowError::new(format!("{activity_id}: {e}"))
                    .with_code("UNKNOWN_ACTIVITY_TYPE"),
            }
        })?;

        let options = call.options.unwrap_or_else(|| self.defaults.clone());
        options
            .retry_policy
            .validate()
            .and_then(|()| options.timeouts.validate())
            .map_err(|e| WorkflowFailure::Validation {
                error: WorkflowError::new(format!("{activity_id}: {e}"))
                    .with_code("INVALID_ACTIVITY_OPTIONS"),
            })?;

        Ok(ScheduledActivity {
            activity_id,
            activity_type: call.activity_type,
            input: call.input,
            options,
            handler,
        })
    }

    /// Run a scheduled activity until it succeeds or fails terminally
    #[instrument(
        skip_all,
        fields(
            workflow_id = %self.workflow_id,
            activity_id = %scheduled.activity_id,
            activity_type = %scheduled.activity_type,
        )
    )]
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        scheduled: &ScheduledActivity,
    ) -> Result<ActivityResult, ActivityFailure> {
        let governor = RetryGovernor::new(scheduled.options.retry_policy.clone());

        let attempted = governor
            .run(cancel, |attempt| self.run_attempt(cancel, scheduled, attempt))
            .await?;

        debug!(attempts = attempted.attempts, "activity completed");

        Ok(ActivityResult {
            activity_id: scheduled.activity_id.clone(),
            value: attempted.value,
            metadata: ResultMetadata {
                attempts: attempted.attempts,
                completed_at: Utc::now(),
            },
        })
    }

    async fn run_attempt(
        &self,
        cancel: &CancellationToken,
        scheduled: &ScheduledActivity,
        attempt: u32,
    ) -> Result<Value, ActivityError> {
        let timeouts = &scheduled.options.timeouts;
        let token = cancel.child_token();

        let ctx = ActivityContext::new(
            self.workflow_id,
            scheduled.activity_id.clone(),
            attempt,
            scheduled.options.retry_policy.max_attempts,
        )
        .with_cancellation(token.clone());
        let heartbeats = ctx.heartbeat_receiver();
        let monitor = timeouts.heartbeat.map(HeartbeatMonitor::new);

        debug!(attempt, handle_id = %ctx.handle_id, "starting activity attempt");

        // A panicking body fails its attempt permanently instead of unwinding
        // through the workflow
        let body = AssertUnwindSafe((scheduled.handler)(ctx, scheduled.input.clone()))
            .catch_unwind()
            .map(|caught| caught.unwrap_or_else(|panic| Err(panicked(panic.as_ref()))));
        let limit = timeouts.start_to_close;

        // The body goes first so an activity that observed cancellation or
        // finished right at a deadline reports its own outcome
        let outcome = tokio::select! {
            biased;

            result = tokio::time::timeout(limit, body) => match result {
                Ok(result) => result,
                Err(_) => {
                    warn!(attempt, ?limit, "activity attempt timed out");
                    Err(ActivityError::timed_out(TimeoutType::StartToClose, limit))
                }
            },
            ObservedStatus::Stalled { silent_for, beats } =
                watch_heartbeats(monitor, heartbeats) =>
            {
                warn!(attempt, beats, "activity stalled");
                Err(ActivityError::timed_out(TimeoutType::Heartbeat, silent_for))
            }
            _ = cancel.cancelled() => {
                Err(ActivityError::transient("activity attempt cancelled")
                    .with_type(CANCELLED_ERROR_TYPE))
            }
        };

        // Stops a body that outlived its attempt (timeout or stall)
        token.cancel();
        outcome
    }
}

fn panicked(payload: &(dyn Any + Send)) -> ActivityError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    warn!(%message, "activity panicked");
    ActivityError::permanent(format!("activity panicked: {message}"))
        .with_type(PANICKED_ERROR_TYPE)
}

async fn watch_heartbeats(
    monitor: Option<HeartbeatMonitor>,
    heartbeats: watch::Receiver<HeartbeatRecord>,
) -> ObservedStatus {
    match monitor {
        Some(monitor) => monitor.watch(heartbeats).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::{RetryPolicy, TimeoutConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn dispatcher(registry: ActivityRegistry, options: ActivityOptions) -> ActivityDispatcher {
        ActivityDispatcher::new(Arc::new(registry), options, Uuid::now_v7())
    }

    fn fast_retries(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(100), max_attempts)
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_start_to_close_timeout_is_retried() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("slow_then_fast", |ctx, _input| async move {
            if ctx.attempt == 1 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(serde_json::json!(ctx.attempt))
        });

        let options = ActivityOptions::default()
            .with_retry_policy(fast_retries(3))
            .with_timeouts(TimeoutConfig::new().with_start_to_close(Duration::from_secs(1)));
        let dispatcher = dispatcher(registry, options);

        let scheduled = dispatcher
            .schedule("leading", ActivityCall::new("slow_then_fast", Value::Null))
            .unwrap();
        let result = dispatcher
            .dispatch(&CancellationToken::new(), &scheduled)
            .await
            .unwrap();

        assert_eq!(result.value, serde_json::json!(2));
        assert_eq!(result.metadata.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_retries() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("never_finishes", |_ctx, _input| async move {
            std::future::pending::<()>().await;
            Ok(Value::Null)
        });

        let options = ActivityOptions::default()
            .with_retry_policy(fast_retries(2))
            .with_timeouts(TimeoutConfig::new().with_start_to_close(Duration::from_secs(1)));
        let dispatcher = dispatcher(registry, options);

        let scheduled = dispatcher
            .schedule("leading", ActivityCall::new("never_finishes", Value::Null))
            .unwrap();
        let failure = dispatcher
            .dispatch(&CancellationToken::new(), &scheduled)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts(), 2);
        assert_eq!(
            failure.last_error().and_then(|e| e.timeout_type()),
            Some(TimeoutType::StartToClose)
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_stalled_attempt_is_retried() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("stalls_once", |ctx, _input| async move {
            ctx.heartbeat(None)?;
            if ctx.attempt == 1 {
                // Goes silent well past the heartbeat deadline
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, ActivityError>(serde_json::json!("done"))
        });

        let options = ActivityOptions::default()
            .with_retry_policy(fast_retries(3))
            .with_timeouts(
                TimeoutConfig::new()
                    .with_start_to_close(Duration::from_secs(60))
                    .with_heartbeat(Duration::from_millis(200)),
            );
        let dispatcher = dispatcher(registry, options);

        let scheduled = dispatcher
            .schedule("fan-out-0", ActivityCall::new("stalls_once", Value::Null))
            .unwrap();
        let result = dispatcher
            .dispatch(&CancellationToken::new(), &scheduled)
            .await
            .unwrap();

        assert_eq!(result.metadata.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_heartbeats_outlive_deadline() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("long_running", |ctx, _input| async move {
            for step in 0..20 {
                tokio::time::sleep(Duration::from_millis(90)).await;
                ctx.heartbeat(Some(serde_json::json!({"step": step})))?;
            }
            Ok::<_, ActivityError>(serde_json::json!(ctx.last_heartbeat().beats))
        });

        let options = ActivityOptions::default()
            .with_retry_policy(RetryPolicy::no_retry())
            .with_timeouts(
                TimeoutConfig::new()
                    .with_start_to_close(Duration::from_secs(60))
                    .with_heartbeat(Duration::from_millis(100)),
            );
        let dispatcher = dispatcher(registry, options);

        let scheduled = dispatcher
            .schedule("fan-out-0", ActivityCall::new("long_running", Value::Null))
            .unwrap();
        let result = dispatcher
            .dispatch(&CancellationToken::new(), &scheduled)
            .await
            .unwrap();

        assert_eq!(result.value, serde_json::json!(20));
        assert_eq!(result.metadata.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_running_attempt() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("waits", |_ctx, _input| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        });

        let dispatcher = dispatcher(registry, ActivityOptions::default());
        let scheduled = dispatcher
            .schedule("leading", ActivityCall::new("waits", Value::Null))
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let failure = dispatcher.dispatch(&cancel, &scheduled).await.unwrap_err();
        assert_eq!(failure, ActivityFailure::Cancelled { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_body_fails_permanently() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let mut registry = ActivityRegistry::new();
        registry.register_fn("explodes", move |ctx, _input| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if ctx.attempt > 0 {
                    panic!("boom in activity body");
                }
                Ok(Value::Null)
            }
        });

        let options = ActivityOptions::default().with_retry_policy(fast_retries(3));
        let dispatcher = dispatcher(registry, options);
        let scheduled = dispatcher
            .schedule("leading", ActivityCall::new("explodes", Value::Null))
            .unwrap();

        let failure = dispatcher
            .dispatch(&CancellationToken::new(), &scheduled)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match failure {
            ActivityFailure::Permanent { attempts, error } => {
                assert_eq!(attempts, 1);
                assert_eq!(error.error_type.as_deref(), Some(PANICKED_ERROR_TYPE));
                assert!(error.message.contains("boom in activity body"));
            }
            other => panic!("expected permanent failure, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_activity_type_is_validation_failure() {
        let dispatcher = dispatcher(ActivityRegistry::new(), ActivityOptions::default());

        let failure = dispatcher
            .schedule("leading", ActivityCall::new("missing", Value::Null))
            .unwrap_err();

        match failure {
            WorkflowFailure::Validation { error } => {
                assert_eq!(error.code.as_deref(), Some("UNKNOWN_ACTIVITY_TYPE"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_call_options_are_rejected() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("noop", |_ctx, input| async move { Ok(input) });
        let dispatcher = dispatcher(registry, ActivityOptions::default());

        let options = ActivityOptions::default()
            .with_timeouts(TimeoutConfig::new().with_start_to_close(Duration::ZERO));
        let failure = dispatcher
            .schedule(
                "leading",
                ActivityCall::new("noop", Value::Null).with_options(options),
            )
            .unwrap_err();

        assert!(matches!(failure, WorkflowFailure::Validation { .. }));
    }
}
