//! # Durable Orchestration Engine
//!
//! An embeddable workflow orchestration core for reliable task execution.
//!
//! ## Features
//!
//! - **Deterministic workflows**: Phase functions depend only on the input and
//!   observed activity results, so recorded runs can be replayed
//! - **Automatic retries**: Configurable retry policies with exponential backoff
//! - **Timeouts and heartbeats**: Per-attempt deadlines and stall detection for
//!   long-running activities
//! - **Fan-out / fan-in**: Bounded parallel phases that collect every outcome
//!   exactly once
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                           │
//! │  (validates input, sequences phases, records history)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FanOutCoordinator                         │
//! │  (runs a parallel phase on a JoinSet, results in input order)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ActivityDispatcher                         │
//! │  (retry governor, start-to-close timeout, heartbeat monitor) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use weft_durable::prelude::*;
//!
//! struct MyWorkflow;
//!
//! impl Workflow for MyWorkflow {
//!     const TYPE: &'static str = "my_workflow";
//!     type Input = MyInput;
//!     type Output = MyOutput;
//!
//!     fn leading_activity(&self, input: &MyInput) -> Result<ActivityCall, WorkflowError> {
//!         ActivityCall::of::<LookupActivity>(&input.key)
//!     }
//!
//!     // ... implement fan_out and aggregate
//! }
//!
//! let orchestrator = Orchestrator::new(MyWorkflow, Arc::new(registry), EngineConfig::default())?;
//! let output = orchestrator.run(&CancellationToken::new(), input).await?;
//! ```

pub mod activity;
pub mod engine;
pub mod reliability;
pub mod workflow;

mod serde_duration;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{
        Activity, ActivityContext, ActivityError, ActivityFailure, ActivityRegistry,
    };
    pub use crate::engine::{EngineConfig, Orchestrator, WorkflowRun, WorkflowStatus};
    pub use crate::reliability::{RetryPolicy, TimeoutConfig};
    pub use crate::workflow::{
        ActivityCall, ActivityOptions, ActivityResult, Workflow, WorkflowError, WorkflowFailure,
    };
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;
}

// Re-export key types at crate root
pub use activity::{
    Activity, ActivityContext, ActivityError, ActivityFailure, ActivityRegistry, ErrorKind,
};
pub use engine::{ConfigError, EngineConfig, Orchestrator, WorkflowRun, WorkflowStatus};
pub use reliability::{RetryPolicy, TimeoutConfig};
pub use workflow::{
    ActivityCall, ActivityOptions, ActivityResult, History, Workflow, WorkflowError,
    WorkflowEvent, WorkflowFailure,
};
