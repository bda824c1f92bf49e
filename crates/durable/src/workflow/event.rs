//! Workflow events and execution history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityResult, ResultMetadata, WorkflowFailure};
use crate::activity::ActivityFailure;

/// Events recorded while a workflow runs
///
/// The history is kept in memory; it serializes so an embedding
/// application can store it and later hand it back for replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    // =========================================================================
    // Workflow Lifecycle Events
    // =========================================================================
    /// Workflow was started with the given input
    WorkflowStarted {
        workflow_type: String,
        input: serde_json::Value,
    },

    /// Workflow completed successfully
    WorkflowCompleted { result: serde_json::Value },

    /// Workflow failed
    WorkflowFailed { failure: WorkflowFailure },

    // =========================================================================
    // Activity Lifecycle Events
    // =========================================================================
    /// Activity was dispatched
    ActivityScheduled {
        /// Unique activity identifier within the workflow
        activity_id: String,
        activity_type: String,
        input: serde_json::Value,
    },

    /// Activity completed successfully
    ActivityCompleted {
        activity_id: String,
        result: serde_json::Value,

        /// Attempt that produced the result
        attempts: u32,
        completed_at: DateTime<Utc>,
    },

    /// Activity failed terminally
    ActivityFailed {
        activity_id: String,
        failure: ActivityFailure,
    },
}

impl WorkflowEvent {
    /// Activity the event refers to, if any
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::ActivityScheduled { activity_id, .. }
            | Self::ActivityCompleted { activity_id, .. }
            | Self::ActivityFailed { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }
}

/// An event together with its position in the history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEvent {
    /// Monotonically increasing, starting at 0
    pub sequence: u64,

    pub recorded_at: DateTime<Utc>,

    pub event: WorkflowEvent,
}

/// Append-only event log of one workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct History {
    events: Vec<HistoryEvent>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from stored events
    ///
    /// Events are re-sequenced in the given order.
    pub fn from_events(events: impl IntoIterator<Item = WorkflowEvent>) -> Self {
        let mut history = Self::new();
        for event in events {
            history.push(event);
        }
        history
    }

    /// Append an event and return its sequence number
    pub fn push(&mut self, event: WorkflowEvent) -> u64 {
        let sequence = self.events.len() as u64;
        self.events.push(HistoryEvent {
            sequence,
            recorded_at: Utc::now(),
            event,
        });
        sequence
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The most recent event
    pub fn last(&self) -> Option<&WorkflowEvent> {
        self.events.last().map(|e| &e.event)
    }

    /// Activity type and input recorded when the activity was scheduled
    pub fn scheduled(&self, activity_id: &str) -> Option<(&str, &serde_json::Value)> {
        self.events.iter().find_map(|e| match &e.event {
            WorkflowEvent::ActivityScheduled {
                activity_id: id,
                activity_type,
                input,
            } if id == activity_id => Some((activity_type.as_str(), input)),
            _ => None,
        })
    }

    /// Recorded result of a completed activity
    pub fn completed(&self, activity_id: &str) -> Option<ActivityResult> {
        self.events.iter().find_map(|e| match &e.event {
            WorkflowEvent::ActivityCompleted {
                activity_id: id,
                result,
                attempts,
                completed_at,
            } if id == activity_id => Some(ActivityResult {
                activity_id: id.clone(),
                value: result.clone(),
                metadata: ResultMetadata {
                    attempts: *attempts,
                    completed_at: *completed_at,
                },
            }),
            _ => None,
        })
    }

    /// Recorded terminal failure of an activity
    pub fn failure(&self, activity_id: &str) -> Option<&ActivityFailure> {
        self.events.iter().find_map(|e| match &e.event {
            WorkflowEvent::ActivityFailed {
                activity_id: id,
                failure,
            } if id == activity_id => Some(failure),
            _ => None,
        })
    }

    /// IDs of all scheduled activities, in scheduling order
    pub fn scheduled_ids(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match &e.event {
            WorkflowEvent::ActivityScheduled { activity_id, .. } => Some(activity_id.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> History {
        History::from_events([
            WorkflowEvent::WorkflowStarted {
                workflow_type: "greeting".into(),
                input: serde_json::json!({"name": "weft"}),
            },
            WorkflowEvent::ActivityScheduled {
                activity_id: "leading".into(),
                activity_type: "greet".into(),
                input: serde_json::json!("weft"),
            },
            WorkflowEvent::ActivityCompleted {
                activity_id: "leading".into(),
                result: serde_json::json!("<weft - 12ms>"),
                attempts: 2,
                completed_at: Utc::now(),
            },
        ])
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let history = sample_history();

        let sequences: Vec<_> = history.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_lookups() {
        let history = sample_history();

        let (activity_type, input) = history.scheduled("leading").unwrap();
        assert_eq!(activity_type, "greet");
        assert_eq!(input, &serde_json::json!("weft"));

        let result = history.completed("leading").unwrap();
        assert_eq!(result.value, serde_json::json!("<weft - 12ms>"));
        assert_eq!(result.metadata.attempts, 2);

        assert!(history.completed("fan-out-0").is_none());
        assert!(history.failure("leading").is_none());
        assert_eq!(history.scheduled_ids().collect::<Vec<_>>(), vec!["leading"]);
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkflowEvent::ActivityFailed {
            activity_id: "fan-out-1".into(),
            failure: ActivityFailure::Cancelled { attempts: 1 },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "activity_failed");
        assert_eq!(json["failure"]["kind"], "cancelled");
        assert_eq!(event.activity_id(), Some("fan-out-1"));

        let parsed: WorkflowEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_history_round_trips_through_json() {
        let history = sample_history();

        let json = serde_json::to_string(&history).unwrap();
        let parsed: History = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, history);
    }
}
