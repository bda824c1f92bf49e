//! Structured workflow failures

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::WorkflowError;
use crate::activity::ActivityFailure;
use crate::serde_duration::duration_millis;

/// Workflow phase in which a failure occurred
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validation,
    Leading,
    FanOut,
    Aggregation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Leading => write!(f, "leading"),
            Self::FanOut => write!(f, "fan-out"),
            Self::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// Coarse classification for transport layers mapping failures to responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The caller's input or a permanent business rule rejected the run
    ClientCaused,

    /// The run could not complete (exhausted retries, cancellation, timeouts)
    ExecutionFailed,
}

/// One constituent of a failed fan-out phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedActivity {
    pub activity_id: String,
    pub activity_type: String,
    pub failure: ActivityFailure,
}

/// Terminal failures of a fan-out phase, keyed by input index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateFailure {
    /// Number of activities in the phase
    pub total: usize,

    /// Failed constituents; successful ones are absent
    #[serde(with = "indexed_failures")]
    pub failures: BTreeMap<usize, FailedActivity>,
}

/// Failures serialized as `[index, failure]` pairs
///
/// Integer map keys do not survive the buffering serde does for tagged
/// enums, so the map goes over the wire as a sequence.
mod indexed_failures {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::FailedActivity;

    pub fn serialize<S>(
        failures: &BTreeMap<usize, FailedActivity>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(failures.iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<usize, FailedActivity>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries: Vec<(usize, FailedActivity)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

impl AggregateFailure {
    /// A phase of one activity that did not succeed
    pub fn single(failed: FailedActivity) -> Self {
        Self {
            total: 1,
            failures: BTreeMap::from([(0, failed)]),
        }
    }

    /// Number of constituents that failed
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether any constituent was cancelled
    pub fn any_cancelled(&self) -> bool {
        self.failures.values().any(|f| f.failure.is_cancelled())
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} activities failed", self.failed(), self.total)?;
        for (index, failed) in &self.failures {
            write!(f, "; [{index}] {}: {}", failed.activity_id, failed.failure)?;
        }
        Ok(())
    }
}

/// Why a workflow run ended in `Failed`
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowFailure {
    /// Input or activity call rejected before dispatch
    #[error("validation failed: {error}")]
    Validation { error: WorkflowError },

    /// A sequential activity failed terminally
    #[error("{phase} activity {activity_id} failed: {failure}")]
    Activity {
        phase: Phase,
        activity_id: String,
        failure: ActivityFailure,
    },

    /// One or more parallel activities failed terminally
    #[error("fan-out failed: {0}")]
    Aggregate(AggregateFailure),

    /// The caller cancelled the run
    ///
    /// `activities` keeps every constituent of the interrupted phase that
    /// did not succeed, including terminal failures that came before the
    /// cancellation.
    #[error("workflow cancelled during {phase} phase: {activities}")]
    Cancelled {
        phase: Phase,
        activities: AggregateFailure,
    },

    /// The workflow-level timeout elapsed
    #[error("workflow timed out after {limit:?}")]
    TimedOut {
        #[serde(with = "duration_millis")]
        limit: Duration,
    },

    /// A phase function of the workflow definition returned an error
    #[error("workflow definition failed in {phase} phase: {error}")]
    Definition { phase: Phase, error: WorkflowError },

    /// A recorded history does not match the workflow definition
    #[error("replay diverged from history: {message}")]
    Replay { message: String },
}

impl WorkflowFailure {
    /// Map the failure onto the client/execution split
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Validation { .. } => FailureClass::ClientCaused,
            Self::Activity {
                failure: ActivityFailure::Permanent { .. },
                ..
            } => FailureClass::ClientCaused,
            _ => FailureClass::ExecutionFailed,
        }
    }

    /// The phase the failure occurred in, if it belongs to one
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Validation { .. } => Some(Phase::Validation),
            Self::Activity { phase, .. }
            | Self::Cancelled { phase, .. }
            | Self::Definition { phase, .. } => Some(*phase),
            Self::Aggregate(_) => Some(Phase::FanOut),
            Self::TimedOut { .. } | Self::Replay { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityError;

    #[test]
    fn test_failure_classes() {
        let validation = WorkflowFailure::Validation {
            error: WorkflowError::new("name must not be empty"),
        };
        assert_eq!(validation.class(), FailureClass::ClientCaused);

        let permanent = WorkflowFailure::Activity {
            phase: Phase::Leading,
            activity_id: "leading".into(),
            failure: ActivityFailure::Permanent {
                attempts: 1,
                error: ActivityError::permanent("unknown account"),
            },
        };
        assert_eq!(permanent.class(), FailureClass::ClientCaused);

        let exhausted = WorkflowFailure::Activity {
            phase: Phase::Leading,
            activity_id: "leading".into(),
            failure: ActivityFailure::RetriesExhausted {
                attempts: 3,
                last: ActivityError::transient("unavailable"),
            },
        };
        assert_eq!(exhausted.class(), FailureClass::ExecutionFailed);

        let cancelled = WorkflowFailure::Cancelled {
            phase: Phase::Leading,
            activities: AggregateFailure::single(FailedActivity {
                activity_id: "leading".into(),
                activity_type: "greet".into(),
                failure: ActivityFailure::Cancelled { attempts: 2 },
            }),
        };
        assert_eq!(cancelled.class(), FailureClass::ExecutionFailed);
        assert_eq!(cancelled.phase(), Some(Phase::Leading));
    }

    #[test]
    fn test_cancelled_failure_keeps_prior_failures() {
        let mut failures = BTreeMap::new();
        failures.insert(
            0,
            FailedActivity {
                activity_id: "fan-out-0".into(),
                activity_type: "greet_parallel".into(),
                failure: ActivityFailure::Cancelled { attempts: 1 },
            },
        );
        failures.insert(
            1,
            FailedActivity {
                activity_id: "fan-out-1".into(),
                activity_type: "greet_parallel".into(),
                failure: ActivityFailure::Permanent {
                    attempts: 1,
                    error: ActivityError::permanent("rejected by business rule"),
                },
            },
        );
        let failure = WorkflowFailure::Cancelled {
            phase: Phase::FanOut,
            activities: AggregateFailure { total: 2, failures },
        };

        let message = failure.to_string();
        assert!(message.starts_with("workflow cancelled during fan-out phase: 2 of 2"));
        assert!(message.contains("rejected by business rule"));

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "cancelled");
        let parsed: WorkflowFailure = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, failure);
    }

    #[test]
    fn test_aggregate_failure_retains_inputs() {
        let mut failures = BTreeMap::new();
        failures.insert(
            2,
            FailedActivity {
                activity_id: "fan-out-2".into(),
                activity_type: "greet_parallel".into(),
                failure: ActivityFailure::RetriesExhausted {
                    attempts: 3,
                    last: ActivityError::transient("boom"),
                },
            },
        );
        let aggregate = AggregateFailure { total: 3, failures };

        assert_eq!(aggregate.failed(), 1);
        assert!(!aggregate.any_cancelled());
        assert!(aggregate.to_string().starts_with("1 of 3 activities failed; [2] fan-out-2"));

        let failure = WorkflowFailure::Aggregate(aggregate);
        assert_eq!(failure.class(), FailureClass::ExecutionFailed);

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "aggregate");
        assert_eq!(json["failures"][0][0], 2);

        let parsed: WorkflowFailure = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, failure);
    }

    #[test]
    fn test_timed_out_serialization() {
        let failure = WorkflowFailure::TimedOut {
            limit: Duration::from_secs(5),
        };

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "timed_out", "limit": 5000}));
    }
}
