// Worker configuration
//
// Engine defaults can be overridden per variable; unset or unparsable
// values keep the default.

use std::str::FromStr;
use std::time::Duration;

use weft_durable::EngineConfig;

/// Name greeted when `WEFT_NAME` is unset
pub const DEFAULT_NAME: &str = "World";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Name passed to the greeting workflow
    pub name: String,

    /// Engine configuration for the run
    pub engine: EngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `WEFT_NAME`: Name to greet (default: "World")
    /// - `WEFT_MAX_ATTEMPTS`: Attempts per activity, 0 = unlimited (default: 3)
    /// - `WEFT_INITIAL_INTERVAL_MS`: First retry delay (default: 1000)
    /// - `WEFT_BACKOFF_COEFFICIENT`: Retry delay multiplier (default: 2.0)
    /// - `WEFT_MAX_INTERVAL_MS`: Retry delay cap (default: 60000)
    /// - `WEFT_START_TO_CLOSE_MS`: Per-attempt deadline (default: 10000)
    /// - `WEFT_HEARTBEAT_TIMEOUT_MS`: Heartbeat deadline (default: disabled)
    /// - `WEFT_WORKFLOW_TIMEOUT_MS`: Bound on the whole run (default: none)
    /// - `WEFT_FAN_OUT_WIDTH`: Parallel greetings (default: 3)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| setting(&lookup, key).map(Duration::from_millis);

        let defaults = EngineConfig::default();

        let mut retry_policy = defaults.retry_policy;
        if let Some(max_attempts) = setting(&lookup, "WEFT_MAX_ATTEMPTS") {
            retry_policy = retry_policy.with_max_attempts(max_attempts);
        }
        if let Some(interval) = millis("WEFT_INITIAL_INTERVAL_MS") {
            retry_policy = retry_policy.with_initial_interval(interval);
        }
        if let Some(coefficient) = setting(&lookup, "WEFT_BACKOFF_COEFFICIENT") {
            retry_policy = retry_policy.with_backoff_coefficient(coefficient);
        }
        if let Some(interval) = millis("WEFT_MAX_INTERVAL_MS") {
            retry_policy = retry_policy.with_max_interval(interval);
        }

        let mut timeouts = defaults.timeouts;
        if let Some(limit) = millis("WEFT_START_TO_CLOSE_MS") {
            timeouts = timeouts.with_start_to_close(limit);
        }
        if let Some(limit) = millis("WEFT_HEARTBEAT_TIMEOUT_MS") {
            timeouts = timeouts.with_heartbeat(limit);
        }

        let mut engine = EngineConfig::new()
            .with_retry_policy(retry_policy)
            .with_timeouts(timeouts);
        if let Some(limit) = millis("WEFT_WORKFLOW_TIMEOUT_MS") {
            engine = engine.with_workflow_timeout(limit);
        }
        if let Some(width) = setting(&lookup, "WEFT_FAN_OUT_WIDTH") {
            engine = engine.with_fan_out_width(width);
        }

        Self {
            name: lookup("WEFT_NAME").unwrap_or_else(|| DEFAULT_NAME.to_string()),
            engine,
        }
    }
}

fn setting<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
