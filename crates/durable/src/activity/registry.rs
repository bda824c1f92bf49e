//! Activity registry for dispatch by name
//!
//! The registry maps activity type names to type-erased handlers. Handlers
//! take and return JSON so the engine can dispatch an activity without
//! knowing its concrete types.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::definition::INVALID_INPUT_ERROR_TYPE;
use super::{Activity, ActivityContext, ActivityError};

/// Future returned by a type-erased activity handler
pub type HandlerFuture = BoxFuture<'static, Result<Value, ActivityError>>;

/// Type-erased activity handler
pub type ActivityHandler = Arc<dyn Fn(ActivityContext, Value) -> HandlerFuture + Send + Sync>;

/// Errors from registry operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Activity type not registered
    #[error("unknown activity type: {0}")]
    UnknownActivityType(String),
}

/// Registry of activity handlers
///
/// Populated once at process start and then shared (behind an `Arc`) by
/// every orchestrator that dispatches activities from it.
#[derive(Default)]
pub struct ActivityRegistry {
    handlers: HashMap<String, ActivityHandler>,
}

impl ActivityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity implementation under its [`Activity::TYPE`]
    ///
    /// Input that fails to decode into `A::Input` is reported as a
    /// permanent failure: retrying would decode the same bytes again.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut registry = ActivityRegistry::new();
    /// registry.register(SendEmailActivity);
    /// ```
    pub fn register<A: Activity>(&mut self, activity: A) {
        let activity = Arc::new(activity);
        let handler = move |ctx: ActivityContext, input: Value| -> HandlerFuture {
            let activity = Arc::clone(&activity);
            Box::pin(async move {
                let input: A::Input = serde_json::from_value(input).map_err(|e| {
                    ActivityError::permanent(format!("invalid input for {}: {e}", A::TYPE))
                        .with_type(INVALID_INPUT_ERROR_TYPE)
                })?;

                let output = activity.execute(&ctx, input).await?;

                serde_json::to_value(output).map_err(|e| {
                    ActivityError::permanent(format!("failed to encode {} output: {e}", A::TYPE))
                })
            })
        };

        self.handlers.insert(A::TYPE.to_string(), Arc::new(handler));
    }

    /// Register a closure-based handler working directly on JSON
    pub fn register_fn<F, Fut>(&mut self, activity_type: impl Into<String>, handler: F)
    where
        F: Fn(ActivityContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActivityError>> + Send + 'static,
    {
        let handler: ActivityHandler =
            Arc::new(move |ctx, input| -> HandlerFuture { Box::pin(handler(ctx, input)) });
        self.handlers.insert(activity_type.into(), handler);
    }

    /// Check if an activity type is registered
    pub fn contains(&self, activity_type: &str) -> bool {
        self.handlers.contains_key(activity_type)
    }

    /// Look up the handler for an activity type
    pub fn get(&self, activity_type: &str) -> Result<ActivityHandler, RegistryError> {
        self.handlers
            .get(activity_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownActivityType(activity_type.to_string()))
    }

    /// Get the number of registered activity types
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Get all registered activity type names
    pub fn activity_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activity_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ErrorKind;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Serialize, Deserialize)]
    struct DoubleInput {
        value: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct DoubleOutput {
        doubled: i64,
    }

    struct DoubleActivity;

    #[async_trait]
    impl Activity for DoubleActivity {
        const TYPE: &'static str = "double";
        type Input = DoubleInput;
        type Output = DoubleOutput;

        async fn execute(
            &self,
            ctx: &ActivityContext,
            input: Self::Input,
        ) -> Result<Self::Output, ActivityError> {
            ctx.heartbeat(None)?;
            Ok(DoubleOutput {
                doubled: input.value * 2,
            })
        }
    }

    fn context() -> ActivityContext {
        ActivityContext::new(Uuid::now_v7(), "leading", 1, 3)
    }

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let mut registry = ActivityRegistry::new();
        registry.register(DoubleActivity);

        assert!(registry.contains("double"));
        assert_eq!(registry.len(), 1);

        let handler = registry.get("double").unwrap();
        let output = handler(context(), serde_json::json!({"value": 21}))
            .await
            .unwrap();

        assert_eq!(output, serde_json::json!({"doubled": 42}));
    }

    #[tokio::test]
    async fn test_invalid_input_is_permanent() {
        let mut registry = ActivityRegistry::new();
        registry.register(DoubleActivity);

        let handler = registry.get("double").unwrap();
        let error = handler(context(), serde_json::json!({"value": "twenty"}))
            .await
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::Permanent);
        assert_eq!(error.error_type.as_deref(), Some(INVALID_INPUT_ERROR_TYPE));
    }

    #[tokio::test]
    async fn test_register_fn() {
        let mut registry = ActivityRegistry::new();
        registry.register_fn("echo", |_ctx, input| async move { Ok(input) });

        let handler = registry.get("echo").unwrap();
        let output = handler(context(), serde_json::json!("hello")).await.unwrap();
        assert_eq!(output, serde_json::json!("hello"));
    }

    #[test]
    fn test_unknown_activity_type() {
        let registry = ActivityRegistry::new();

        assert!(registry.is_empty());
        assert_eq!(
            registry.get("missing").err(),
            Some(RegistryError::UnknownActivityType("missing".to_string()))
        );
    }

    #[test]
    fn test_registry_debug() {
        let mut registry = ActivityRegistry::new();
        registry.register(DoubleActivity);

        let debug_str = format!("{:?}", registry);
        assert!(debug_str.contains("double"));

        let types: Vec<_> = registry.activity_types().collect();
        assert_eq!(types, vec!["double"]);
    }
}
