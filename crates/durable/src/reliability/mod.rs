//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff
//! - [`RetryGovernor`] - Applies a retry policy to activity attempts
//! - [`TimeoutConfig`] - Start-to-close and heartbeat deadlines
//! - [`HeartbeatMonitor`] - Stall detection for heartbeating activities

mod governor;
mod heartbeat;
mod retry;
mod timeout;

pub use governor::{Attempted, RetryGovernor};
pub use heartbeat::{HeartbeatMonitor, HeartbeatRecord, ObservedStatus};
pub use retry::{PolicyError, RetryPolicy};
pub use timeout::{TimeoutConfig, TimeoutType};
