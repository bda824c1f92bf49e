//! Fan-out / fan-in coordination
//!
//! Runs a set of scheduled activities concurrently on a [`JoinSet`] and
//! collects every outcome exactly once. Completions are consumed in the
//! order they finish; each result is written to the slot of its input, so
//! callers always see results in input order.

use std::collections::{BTreeMap, HashMap};

use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::dispatch::{ActivityDispatcher, ScheduledActivity, PANICKED_ERROR_TYPE};
use crate::activity::{ActivityError, ActivityFailure};
use crate::workflow::{ActivityResult, AggregateFailure, FailedActivity};

/// Lifecycle of one activity in a parallel phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ActivityState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Coordinator-side handle of one dispatched activity
#[derive(Debug)]
pub struct ActivityHandle {
    /// Position of the activity's input in the phase
    pub index: usize,
    pub activity_id: String,
    pub activity_type: String,
    state: ActivityState,
}

impl ActivityHandle {
    fn new(index: usize, scheduled: &ScheduledActivity) -> Self {
        Self {
            index,
            activity_id: scheduled.activity_id.clone(),
            activity_type: scheduled.activity_type.clone(),
            state: ActivityState::Pending,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    fn transition(&mut self, next: ActivityState) {
        if self.state.is_terminal() {
            warn!(
                activity_id = %self.activity_id,
                from = ?self.state,
                to = ?next,
                "ignoring transition out of terminal state"
            );
            return;
        }
        self.state = next;
    }
}

/// Outstanding handles of one phase, keyed by task id
///
/// Only ever shrinks once the phase has been launched.
#[derive(Debug, Default)]
struct PendingSet {
    handles: HashMap<task::Id, ActivityHandle>,
}

impl PendingSet {
    fn insert(&mut self, id: task::Id, handle: ActivityHandle) {
        self.handles.insert(id, handle);
    }

    fn take(&mut self, id: task::Id) -> Option<ActivityHandle> {
        self.handles.remove(&id)
    }

    fn len(&self) -> usize {
        self.handles.len()
    }

    fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Results of a fully successful phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutcome {
    /// One result per input, in input order
    pub results: Vec<ActivityResult>,

    /// Input indices in the order their activities finished
    pub completion_order: Vec<usize>,
}

/// A phase in which at least one activity did not succeed
///
/// Siblings that did succeed keep their results, so the whole phase can be
/// recorded and later replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseFailure {
    /// Constituents that failed or were cancelled, keyed by input index
    pub failure: AggregateFailure,

    /// One slot per input, `None` where the activity did not succeed
    pub results: Vec<Option<ActivityResult>>,

    /// Input indices in the order their activities finished
    pub completion_order: Vec<usize>,
}

impl PhaseFailure {
    /// Whether the phase ended because it was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.failure.any_cancelled()
    }
}

/// Runs parallel phases for one workflow run
#[derive(Debug, Clone)]
pub struct FanOutCoordinator {
    dispatcher: ActivityDispatcher,
}

impl FanOutCoordinator {
    pub fn new(dispatcher: ActivityDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Dispatch every activity at once and wait for all of them
    ///
    /// A terminal failure never cancels siblings; the phase waits for every
    /// activity and reports all failures together. Only `cancel` stops
    /// outstanding activities.
    #[instrument(
        skip_all,
        fields(workflow_id = %self.dispatcher.workflow_id(), total = activities.len())
    )]
    pub async fn run_parallel(
        &self,
        cancel: &CancellationToken,
        activities: Vec<ScheduledActivity>,
    ) -> Result<PhaseOutcome, PhaseFailure> {
        let total = activities.len();
        let mut slots: Vec<Option<ActivityResult>> = vec![None; total];
        let mut failures = BTreeMap::new();
        let mut completion_order = Vec::with_capacity(total);
        let mut pending = PendingSet::default();
        let mut tasks = JoinSet::new();

        info!(total, "starting parallel phase");

        for (index, scheduled) in activities.into_iter().enumerate() {
            let mut handle = ActivityHandle::new(index, &scheduled);
            let dispatcher = self.dispatcher.clone();
            let cancel = cancel.clone();

            let abort =
                tasks.spawn(async move { dispatcher.dispatch(&cancel, &scheduled).await });
            handle.transition(ActivityState::Running);
            pending.insert(abort.id(), handle);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(err) => {
                    let failure = ActivityFailure::Permanent {
                        attempts: 0,
                        error: ActivityError::permanent(format!("activity task failed: {err}"))
                            .with_type(PANICKED_ERROR_TYPE),
                    };
                    (err.id(), Err(failure))
                }
            };

            let Some(mut handle) = pending.take(id) else {
                warn!(%id, "completion for unknown task");
                continue;
            };
            completion_order.push(handle.index);

            match outcome {
                Ok(result) => {
                    handle.transition(ActivityState::Succeeded);
                    info!(
                        activity_id = %handle.activity_id,
                        attempts = result.metadata.attempts,
                        remaining = pending.len(),
                        "parallel activity completed"
                    );
                    slots[handle.index] = Some(result);
                }
                Err(failure) => {
                    let state = if failure.is_cancelled() {
                        ActivityState::Cancelled
                    } else {
                        ActivityState::Failed
                    };
                    handle.transition(state);
                    warn!(
                        activity_id = %handle.activity_id,
                        error = %failure,
                        remaining = pending.len(),
                        "parallel activity failed"
                    );
                    failures.insert(
                        handle.index,
                        FailedActivity {
                            activity_id: handle.activity_id,
                            activity_type: handle.activity_type,
                            failure,
                        },
                    );
                }
            }
        }

        debug_assert!(pending.is_empty());

        if !failures.is_empty() {
            return Err(PhaseFailure {
                failure: AggregateFailure { total, failures },
                results: slots,
                completion_order,
            });
        }

        debug!(?completion_order, "parallel phase completed");

        Ok(PhaseOutcome {
            results: slots.into_iter().flatten().collect(),
            completion_order,
        })
    }
}
