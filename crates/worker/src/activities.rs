// Greeting activities
//
// Both activities simulate work of a random duration of up to one second
// and record a heartbeat before long stretches of work.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weft_durable::activity::{Activity, ActivityContext, ActivityError, HeartbeatError};

/// Simulated work above this duration heartbeats first
const HEARTBEAT_THRESHOLD_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetInput {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetOutput {
    pub value: String,
}

/// Leading activity: wraps the name as `<name - Nms>`
pub struct GreetActivity;

#[async_trait]
impl Activity for GreetActivity {
    const TYPE: &'static str = "greet";
    type Input = GreetInput;
    type Output = GreetOutput;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError> {
        info!(name = %input.name, attempt = ctx.attempt, "greet activity");

        let duration_ms = simulate_work(ctx).await?;

        Ok(GreetOutput {
            value: format!("<{} - {duration_ms}ms>", input.name),
        })
    }
}

/// Parallel activity: wraps the value as `[value - Nms]`
pub struct ParallelGreetActivity;

#[async_trait]
impl Activity for ParallelGreetActivity {
    const TYPE: &'static str = "greet_parallel";
    type Input = GreetInput;
    type Output = GreetOutput;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError> {
        info!(
            name = %input.name,
            activity_id = %ctx.activity_id,
            attempt = ctx.attempt,
            "parallel greet activity"
        );

        let duration_ms = simulate_work(ctx).await?;

        Ok(GreetOutput {
            value: format!("[{} - {duration_ms}ms]", input.name),
        })
    }
}

/// Sleep for a random duration, returning early if the attempt is cancelled
async fn simulate_work(ctx: &ActivityContext) -> Result<u64, ActivityError> {
    let duration_ms = rand::thread_rng().gen_range(0..1000u64);
    debug!(duration_ms, "activity working");

    if duration_ms > HEARTBEAT_THRESHOLD_MS {
        ctx.heartbeat(Some(serde_json::json!("processing")))?;
    }

    tokio::select! {
        _ = ctx.cancelled() => Err(HeartbeatError::Cancelled.into()),
        _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => Ok(duration_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;
    use weft_durable::activity::CANCELLED_ERROR_TYPE;

    fn context() -> ActivityContext {
        ActivityContext::new(Uuid::nil(), "leading", 1, 3)
    }

    /// Parse the duration out of `<name - Nms>` / `[name - Nms]`
    fn duration_of(value: &str) -> u64 {
        let start = value.rfind(" - ").unwrap() + 3;
        let end = value.rfind("ms").unwrap();
        value[start..end].parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_greet_wraps_name() {
        let output = GreetActivity
            .execute(
                &context(),
                GreetInput {
                    name: "weft".into(),
                },
            )
            .await
            .unwrap();

        assert!(output.value.starts_with("<weft - "));
        assert!(output.value.ends_with("ms>"));
        assert!(duration_of(&output.value) < 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_greet_wraps_value() {
        let output = ParallelGreetActivity
            .execute(
                &context(),
                GreetInput {
                    name: "<weft - 12ms>".into(),
                },
            )
            .await
            .unwrap();

        assert!(output.value.starts_with("[<weft - 12ms> - "));
        assert!(output.value.ends_with("ms]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_attempt_stops_work() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = context().with_cancellation(token);

        let error = GreetActivity
            .execute(
                &ctx,
                GreetInput {
                    name: "weft".into(),
                },
            )
            .await
            .unwrap_err();

        assert!(error.is_retryable());
        assert_eq!(error.error_type.as_deref(), Some(CANCELLED_ERROR_TYPE));
    }
}
