//! Activity abstractions
//!
//! Activities are units of work dispatched by the engine. They:
//! - Fail with an explicit transient/permanent classification
//! - Can send heartbeats to indicate liveness
//! - Observe cancellation through their [`ActivityContext`]
//! - Are registered by name in an [`ActivityRegistry`]

mod context;
mod definition;
mod failure;
mod registry;

pub use context::{ActivityContext, HeartbeatError};
pub use definition::{
    Activity, ActivityError, ErrorKind, CANCELLED_ERROR_TYPE, INVALID_INPUT_ERROR_TYPE,
};
pub use failure::ActivityFailure;
pub use registry::{ActivityHandler, ActivityRegistry, HandlerFuture, RegistryError};
