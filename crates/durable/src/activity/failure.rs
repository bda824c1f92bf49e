//! Terminal activity failures

use serde::{Deserialize, Serialize};

use super::ActivityError;

/// Failure of an activity once the retry governor has given up on it
///
/// Transient errors never escape the governor directly; they are either
/// retried or wrapped in [`ActivityFailure::RetriesExhausted`].
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityFailure {
    /// The activity raised a permanent error
    #[error("activity failed permanently on attempt {attempts}: {error}")]
    Permanent { attempts: u32, error: ActivityError },

    /// Every allowed attempt failed with a transient error
    #[error("activity retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ActivityError },

    /// The caller cancelled the activity
    #[error("activity cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl ActivityFailure {
    /// Number of attempts made before the failure became terminal
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. }
            | Self::RetriesExhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// The error raised by the last attempt, if any
    pub fn last_error(&self) -> Option<&ActivityError> {
        match self {
            Self::Permanent { error, .. } => Some(error),
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether the failure was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
