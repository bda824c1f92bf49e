use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use weft_durable::Orchestrator;
use weft_worker::config::WorkerConfig;
use weft_worker::greeting::{GreetingInput, GreetingWorkflow};
use weft_worker::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG or LOG_LEVEL: Log filter (default: "info")
    init_telemetry(TelemetryConfig::from_env());

    tracing::info!("weft-worker starting...");

    let config = WorkerConfig::from_env();

    tracing::info!(
        name = %config.name,
        fan_out_width = config.engine.fan_out_width,
        max_attempts = config.engine.retry_policy.max_attempts,
        "Starting greeting workflow"
    );

    let orchestrator = Orchestrator::new(
        GreetingWorkflow,
        Arc::new(weft_worker::registry()),
        config.engine,
    )
    .context("Invalid engine configuration")?;

    let cancel = CancellationToken::new();
    let input = GreetingInput { name: config.name };

    let run = orchestrator.execute(&cancel, input);
    tokio::pin!(run);

    // Ctrl-C cancels the run; the run still settles and reports its outcome
    let run = tokio::select! {
        run = &mut run => run,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            cancel.cancel();
            run.await
        }
    };

    tracing::info!(
        workflow_id = %run.workflow_id,
        status = ?run.status,
        events = run.history.len(),
        "Workflow finished"
    );

    let output = run.into_result().context("Greeting workflow failed")?;
    tracing::info!(result = %output.value, "Greeting workflow result");

    Ok(())
}
