//! Sample greeting workflow for the weft orchestration engine
//!
//! [`greeting::GreetingWorkflow`] greets a name once, then greets that
//! greeting `fan_out_width` times in parallel and joins the results.

pub mod activities;
pub mod config;
pub mod greeting;
pub mod telemetry;

use weft_durable::ActivityRegistry;

use activities::{GreetActivity, ParallelGreetActivity};

/// Registry holding every activity the greeting workflow dispatches
pub fn registry() -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    registry.register(GreetActivity);
    registry.register(ParallelGreetActivity);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_durable::Activity;

    #[test]
    fn test_registry_contents() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(GreetActivity::TYPE));
        assert!(registry.contains(ParallelGreetActivity::TYPE));
    }
}
