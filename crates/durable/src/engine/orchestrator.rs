//! Workflow orchestrator
//!
//! Drives one [`Workflow`] definition through its phases: validation, the
//! leading activity, the parallel phase and aggregation. Every decision is
//! taken by the definition's pure phase functions from the input and the
//! activity results already observed, which is what makes [`Orchestrator::replay`]
//! possible.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::dispatch::{ActivityDispatcher, ScheduledActivity};
use super::fanout::FanOutCoordinator;
use super::{ConfigError, EngineConfig};
use crate::activity::{ActivityFailure, ActivityRegistry};
use crate::workflow::{
    ActivityCall, ActivityResult, AggregateFailure, FailedActivity, History, Phase, Workflow,
    WorkflowError, WorkflowEvent, WorkflowFailure,
};

/// Activity ID of the leading activity
pub const LEADING_ACTIVITY_ID: &str = "leading";

/// Activity ID of the parallel activity for input `index`
pub fn fan_out_activity_id(index: usize) -> String {
    format!("fan-out-{index}")
}

/// Workflow run status
///
/// `Completed` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Created, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    fn advance(&mut self, next: WorkflowStatus) {
        if self.can_transition_to(next) {
            *self = next;
        } else {
            warn!(from = ?self, to = ?next, "ignoring invalid workflow status transition");
        }
    }
}

/// Everything known about a finished run
#[derive(Debug)]
pub struct WorkflowRun<O> {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub outcome: Result<O, WorkflowFailure>,
    pub history: History,
}

impl<O> WorkflowRun<O> {
    pub fn into_result(self) -> Result<O, WorkflowFailure> {
        self.outcome
    }
}

/// Executes runs of one workflow definition
///
/// The registry and configuration are injected; an orchestrator holds no
/// per-run state and may execute any number of runs concurrently.
pub struct Orchestrator<W: Workflow> {
    workflow: W,
    registry: Arc<ActivityRegistry>,
    config: EngineConfig,
}

impl<W: Workflow> std::fmt::Debug for Orchestrator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workflow_type", &W::TYPE)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl<W: Workflow> Orchestrator<W> {
    /// Create an orchestrator, rejecting invalid configuration
    pub fn new(
        workflow: W,
        registry: Arc<ActivityRegistry>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            workflow,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the workflow to completion and return its output
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        input: W::Input,
    ) -> Result<W::Output, WorkflowFailure> {
        self.execute(cancel, input).await.into_result()
    }

    /// Run the workflow and return the full run record
    #[instrument(skip_all, fields(workflow_type = W::TYPE, workflow_id = tracing::field::Empty))]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        input: W::Input,
    ) -> WorkflowRun<W::Output> {
        let workflow_id = Uuid::now_v7();
        tracing::Span::current().record("workflow_id", tracing::field::display(workflow_id));

        let mut status = WorkflowStatus::Created;
        let mut history = History::new();

        let outcome = match serde_json::to_value(&input) {
            Ok(encoded) => {
                history.push(WorkflowEvent::WorkflowStarted {
                    workflow_type: W::TYPE.to_string(),
                    input: encoded,
                });
                info!("workflow started");
                self.validate_and_drive(cancel, workflow_id, &input, &mut status, &mut history)
                    .await
            }
            Err(e) => Err(WorkflowFailure::Validation {
                error: WorkflowError::new(format!("failed to encode workflow input: {e}")),
            }),
        };

        let outcome = outcome.and_then(|output| match serde_json::to_value(&output) {
            Ok(result) => {
                history.push(WorkflowEvent::WorkflowCompleted { result });
                Ok(output)
            }
            Err(e) => Err(WorkflowFailure::Definition {
                phase: Phase::Aggregation,
                error: WorkflowError::new(format!("failed to encode workflow output: {e}")),
            }),
        });

        match &outcome {
            Ok(_) => {
                status.advance(WorkflowStatus::Completed);
                info!("workflow completed");
            }
            Err(failure) => {
                history.push(WorkflowEvent::WorkflowFailed {
                    failure: failure.clone(),
                });
                status.advance(WorkflowStatus::Failed);
                error!(error = %failure, class = ?failure.class(), "workflow failed");
            }
        }

        WorkflowRun {
            workflow_id,
            status,
            outcome,
            history,
        }
    }

    async fn validate_and_drive(
        &self,
        cancel: &CancellationToken,
        workflow_id: Uuid,
        input: &W::Input,
        status: &mut WorkflowStatus,
        history: &mut History,
    ) -> Result<W::Output, WorkflowFailure> {
        self.workflow
            .validate(input)
            .map_err(|error| WorkflowFailure::Validation { error })?;

        status.advance(WorkflowStatus::Running);

        let dispatcher = ActivityDispatcher::new(
            Arc::clone(&self.registry),
            self.config.activity_options(),
            workflow_id,
        );
        let token = cancel.child_token();

        let outcome = match self.config.workflow_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.drive(&token, &dispatcher, input, history))
                    .await
                    .unwrap_or_else(|_| {
                        warn!(?limit, "workflow timeout elapsed");
                        Err(WorkflowFailure::TimedOut { limit })
                    })
            }
            None => self.drive(&token, &dispatcher, input, history).await,
        };

        // Stops anything the timeout left behind
        token.cancel();
        outcome
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        dispatcher: &ActivityDispatcher,
        input: &W::Input,
        history: &mut History,
    ) -> Result<W::Output, WorkflowFailure> {
        let call = self
            .workflow
            .leading_activity(input)
            .map_err(|error| WorkflowFailure::Definition {
                phase: Phase::Leading,
                error,
            })?;
        let leading = dispatcher.schedule(LEADING_ACTIVITY_ID, call)?;
        record_scheduled(history, &leading);

        info!(activity_type = %leading.activity_type, "starting leading activity");
        let leading_result = match dispatcher.dispatch(cancel, &leading).await {
            Ok(result) => {
                record_completed(history, &result);
                result
            }
            Err(failure) => {
                record_failed(history, LEADING_ACTIVITY_ID, &failure);
                return Err(leading_failure(&leading.activity_type, failure));
            }
        };

        let calls = self
            .workflow
            .fan_out(input, &leading_result, self.config.fan_out_width)
            .map_err(|error| WorkflowFailure::Definition {
                phase: Phase::FanOut,
                error,
            })?;
        let scheduled = calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| dispatcher.schedule(fan_out_activity_id(index), call))
            .collect::<Result<Vec<_>, _>>()?;
        for activity in &scheduled {
            record_scheduled(history, activity);
        }

        let coordinator = FanOutCoordinator::new(dispatcher.clone());
        let results = match coordinator.run_parallel(cancel, scheduled).await {
            Ok(outcome) => {
                // Recorded in completion order; lookups go by activity ID
                for &index in &outcome.completion_order {
                    record_completed(history, &outcome.results[index]);
                }
                outcome.results
            }
            Err(phase) => {
                // Successful siblings are recorded too, so the run replays
                for &index in &phase.completion_order {
                    match (phase.failure.failures.get(&index), &phase.results[index]) {
                        (Some(failed), _) => {
                            record_failed(history, &failed.activity_id, &failed.failure)
                        }
                        (None, Some(result)) => record_completed(history, result),
                        (None, None) => {}
                    }
                }
                return Err(fan_out_failure(phase.failure));
            }
        };

        debug!(results = results.len(), "aggregating results");
        self.workflow
            .aggregate(input, &results)
            .map_err(|error| WorkflowFailure::Definition {
                phase: Phase::Aggregation,
                error,
            })
    }

    /// Recompute the output of a recorded run without dispatching anything
    ///
    /// Activity results are looked up by activity ID, so the order in which
    /// completions were recorded is irrelevant. Any difference between the
    /// calls the definition makes now and the calls recorded in `history`
    /// is reported as [`WorkflowFailure::Replay`]. A recorded activity
    /// failure is returned as the failure its phase reported live.
    #[instrument(skip_all, fields(workflow_type = W::TYPE, events = history.len()))]
    pub fn replay(
        &self,
        input: &W::Input,
        history: &History,
    ) -> Result<W::Output, WorkflowFailure> {
        if let Some(WorkflowEvent::WorkflowStarted { input: recorded, .. }) =
            history.events().first().map(|e| &e.event)
        {
            let encoded = serde_json::to_value(input).map_err(|e| WorkflowFailure::Replay {
                message: format!("failed to encode workflow input: {e}"),
            })?;
            if &encoded != recorded {
                return Err(WorkflowFailure::Replay {
                    message: "workflow input differs from the recorded input".to_string(),
                });
            }
        }

        self.workflow
            .validate(input)
            .map_err(|error| WorkflowFailure::Validation { error })?;

        let call = self
            .workflow
            .leading_activity(input)
            .map_err(|error| WorkflowFailure::Definition {
                phase: Phase::Leading,
                error,
            })?;
        let leading = match replay_outcome(history, LEADING_ACTIVITY_ID, &call)? {
            Ok(result) => result,
            Err(failure) => return Err(leading_failure(&call.activity_type, failure)),
        };

        let calls = self
            .workflow
            .fan_out(input, &leading, self.config.fan_out_width)
            .map_err(|error| WorkflowFailure::Definition {
                phase: Phase::FanOut,
                error,
            })?;

        let recorded = history
            .scheduled_ids()
            .filter(|id| *id != LEADING_ACTIVITY_ID)
            .count();
        if recorded != calls.len() {
            return Err(WorkflowFailure::Replay {
                message: format!(
                    "definition fans out to {} activities, history records {recorded}",
                    calls.len()
                ),
            });
        }

        let mut results = Vec::with_capacity(calls.len());
        let mut failures = BTreeMap::new();
        for (index, call) in calls.iter().enumerate() {
            let activity_id = fan_out_activity_id(index);
            match replay_outcome(history, &activity_id, call)? {
                Ok(result) => results.push(result),
                Err(failure) => {
                    failures.insert(
                        index,
                        FailedActivity {
                            activity_id,
                            activity_type: call.activity_type.clone(),
                            failure,
                        },
                    );
                }
            }
        }
        if !failures.is_empty() {
            return Err(fan_out_failure(AggregateFailure {
                total: calls.len(),
                failures,
            }));
        }

        debug!(results = results.len(), "replayed activity results");
        self.workflow
            .aggregate(input, &results)
            .map_err(|error| WorkflowFailure::Definition {
                phase: Phase::Aggregation,
                error,
            })
    }
}

/// Failure of the leading phase
fn leading_failure(activity_type: &str, failure: ActivityFailure) -> WorkflowFailure {
    if failure.is_cancelled() {
        WorkflowFailure::Cancelled {
            phase: Phase::Leading,
            activities: AggregateFailure::single(FailedActivity {
                activity_id: LEADING_ACTIVITY_ID.to_string(),
                activity_type: activity_type.to_string(),
                failure,
            }),
        }
    } else {
        WorkflowFailure::Activity {
            phase: Phase::Leading,
            activity_id: LEADING_ACTIVITY_ID.to_string(),
            failure,
        }
    }
}

/// Failure of the fan-out phase; any cancelled constituent makes it a cancellation
fn fan_out_failure(aggregate: AggregateFailure) -> WorkflowFailure {
    if aggregate.any_cancelled() {
        WorkflowFailure::Cancelled {
            phase: Phase::FanOut,
            activities: aggregate,
        }
    } else {
        WorkflowFailure::Aggregate(aggregate)
    }
}

/// Recorded outcome of one activity
///
/// The outer error reports a divergence between `call` and the history.
fn replay_outcome(
    history: &History,
    activity_id: &str,
    call: &ActivityCall,
) -> Result<Result<ActivityResult, ActivityFailure>, WorkflowFailure> {
    let Some((activity_type, input)) = history.scheduled(activity_id) else {
        return Err(WorkflowFailure::Replay {
            message: format!("activity {activity_id} was never scheduled"),
        });
    };

    if activity_type != call.activity_type || input != &call.input {
        return Err(WorkflowFailure::Replay {
            message: format!(
                "activity {activity_id} diverged: recorded {activity_type}({input}), \
                 definition calls {}({})",
                call.activity_type, call.input
            ),
        });
    }

    if let Some(result) = history.completed(activity_id) {
        return Ok(Ok(result));
    }
    if let Some(failure) = history.failure(activity_id) {
        return Ok(Err(failure.clone()));
    }

    // A run cut short by the workflow timeout never recorded this outcome
    match history.last() {
        Some(WorkflowEvent::WorkflowFailed {
            failure: failure @ WorkflowFailure::TimedOut { .. },
        }) => Err(failure.clone()),
        _ => Err(WorkflowFailure::Replay {
            message: format!("no outcome recorded for activity {activity_id}"),
        }),
    }
}

fn record_scheduled(history: &mut History, scheduled: &ScheduledActivity) {
    history.push(WorkflowEvent::ActivityScheduled {
        activity_id: scheduled.activity_id.clone(),
        activity_type: scheduled.activity_type.clone(),
        input: scheduled.input.clone(),
    });
}

fn record_completed(history: &mut History, result: &ActivityResult) {
    history.push(WorkflowEvent::ActivityCompleted {
        activity_id: result.activity_id.clone(),
        result: result.value.clone(),
        attempts: result.metadata.attempts,
        completed_at: result.metadata.completed_at,
    });
}

fn record_failed(history: &mut History, activity_id: &str, failure: &ActivityFailure) {
    history.push(WorkflowEvent::ActivityFailed {
        activity_id: activity_id.to_string(),
        failure: failure.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use WorkflowStatus::*;

        assert!(Created.can_transition_to(Running));
        assert!(Created.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Created.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_status_is_absorbing() {
        let mut status = WorkflowStatus::Running;
        status.advance(WorkflowStatus::Failed);
        status.advance(WorkflowStatus::Completed);

        assert_eq!(status, WorkflowStatus::Failed);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_activity_ids() {
        assert_eq!(LEADING_ACTIVITY_ID, "leading");
        assert_eq!(fan_out_activity_id(2), "fan-out-2");
    }
}
