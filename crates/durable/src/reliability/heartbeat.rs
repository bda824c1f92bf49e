//! Heartbeat records and stall detection
//!
//! Every attempt owns a `watch` channel carrying its [`HeartbeatRecord`].
//! The [`ActivityContext`](crate::activity::ActivityContext) writes to it;
//! the [`HeartbeatMonitor`] reads it and reports a stall once the record
//! goes unchanged for longer than the configured deadline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::serde_duration::millis;

/// Latest heartbeat of one activity attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatRecord {
    /// Attempt this record belongs to
    pub handle_id: Uuid,

    /// When the attempt last reported liveness (dispatch time until the first beat)
    pub last_seen_at: DateTime<Utc>,

    /// Number of heartbeats received
    pub beats: u64,

    /// Progress details attached to the last heartbeat
    pub details: Option<serde_json::Value>,
}

impl HeartbeatRecord {
    /// Create the record for a freshly dispatched attempt
    pub fn new(handle_id: Uuid) -> Self {
        Self {
            handle_id,
            last_seen_at: Utc::now(),
            beats: 0,
            details: None,
        }
    }

    pub(crate) fn beat(&mut self, details: Option<serde_json::Value>) {
        self.last_seen_at = Utc::now();
        self.beats += 1;
        if details.is_some() {
            self.details = details;
        }
    }
}

/// What the monitor observed by the time it stopped watching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedStatus {
    /// The attempt finished before going silent
    Completed { beats: u64 },

    /// No heartbeat arrived within the deadline
    Stalled { silent_for: Duration, beats: u64 },
}

/// Watches one attempt's heartbeats against a deadline
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    deadline: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor that tolerates at most `deadline` between heartbeats
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// The configured deadline
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Watch until the attempt completes or goes silent
    ///
    /// The deadline is measured from the call, then restarted on every
    /// heartbeat. The sender being dropped means the activity body has
    /// returned, which ends the watch as [`ObservedStatus::Completed`].
    pub async fn watch(&self, mut rx: watch::Receiver<HeartbeatRecord>) -> ObservedStatus {
        loop {
            match tokio::time::timeout(self.deadline, rx.changed()).await {
                Ok(Ok(())) => {
                    let beats = rx.borrow_and_update().beats;
                    tracing::trace!(beats, "heartbeat received");
                }
                Ok(Err(_)) => {
                    return ObservedStatus::Completed {
                        beats: rx.borrow().beats,
                    };
                }
                Err(_) => {
                    let beats = rx.borrow().beats;
                    tracing::debug!(
                        beats,
                        deadline_ms = millis(self.deadline),
                        "activity heartbeat deadline missed"
                    );
                    return ObservedStatus::Stalled {
                        silent_for: self.deadline,
                        beats,
                    };
                }
            }
        }
    }
}
