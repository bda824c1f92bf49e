//! Workflow abstractions and types
//!
//! This module contains the core workflow primitives:
//! - [`Workflow`] trait for defining deterministic workflows
//! - [`ActivityCall`] and [`ActivityResult`] exchanged with the engine
//! - [`WorkflowFailure`] for structured run failures
//! - [`WorkflowEvent`] and [`History`] for the recorded execution

mod call;
mod definition;
mod event;
mod failure;

pub use call::{ActivityCall, ActivityOptions, ActivityResult, ResultMetadata};
pub use definition::{Workflow, WorkflowError};
pub use event::{History, HistoryEvent, WorkflowEvent};
pub use failure::{AggregateFailure, FailedActivity, FailureClass, Phase, WorkflowFailure};
