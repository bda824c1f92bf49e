//! Workflow execution engine
//!
//! The engine drives [`Workflow`](crate::workflow::Workflow) definitions:
//! - [`ActivityDispatcher`] runs one activity under retries, timeouts and
//!   heartbeat monitoring
//! - [`FanOutCoordinator`] runs a parallel phase and collects every outcome
//! - [`Orchestrator`] sequences the phases of a run and records its history

mod config;
mod dispatch;
mod fanout;
mod orchestrator;

pub use config::{ConfigError, EngineConfig};
pub use dispatch::{ActivityDispatcher, ScheduledActivity, PANICKED_ERROR_TYPE};
pub use fanout::{ActivityHandle, ActivityState, FanOutCoordinator, PhaseFailure, PhaseOutcome};
pub use orchestrator::{
    fan_out_activity_id, Orchestrator, WorkflowRun, WorkflowStatus, LEADING_ACTIVITY_ID,
};
