//! Workflow trait definition

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{ActivityCall, ActivityResult};

/// Error raised by a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,
}

impl WorkflowError {
    /// Create a new workflow error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// A workflow is a deterministic function of its input and activity results
///
/// The engine drives every workflow through the same phases:
/// 1. `validate` the input; a rejection fails the run before any dispatch
/// 2. run the `leading_activity`
/// 3. derive the parallel calls with `fan_out` and run them concurrently
/// 4. `aggregate` the parallel results into the output
///
/// # Determinism
///
/// Phase functions are synchronous and receive everything they may depend
/// on as arguments. They must not read clocks, random sources or any
/// other ambient state, so that replaying a recorded history always
/// yields the same output. `aggregate` receives results in input order,
/// never in completion order.
///
/// # Example
///
/// ```ignore
/// use weft_durable::prelude::*;
///
/// struct ReportWorkflow;
///
/// impl Workflow for ReportWorkflow {
///     const TYPE: &'static str = "report";
///     type Input = ReportInput;
///     type Output = Report;
///
///     fn leading_activity(&self, input: &ReportInput) -> Result<ActivityCall, WorkflowError> {
///         ActivityCall::of::<FetchIndex>(&input.index_url)
///     }
///
///     fn fan_out(
///         &self,
///         _input: &ReportInput,
///         leading: &ActivityResult,
///         width: usize,
///     ) -> Result<Vec<ActivityCall>, WorkflowError> {
///         let index: Index = leading.decode()?;
///         index.pages.iter().take(width).map(ActivityCall::of::<FetchPage>).collect()
///     }
///
///     fn aggregate(
///         &self,
///         _input: &ReportInput,
///         results: &[ActivityResult],
///     ) -> Result<Report, WorkflowError> {
///         Ok(Report { pages: results.iter().map(|r| r.decode()).collect::<Result<_, _>>()? })
///     }
/// }
/// ```
pub trait Workflow: Send + Sync + 'static {
    /// Unique type identifier for this workflow
    const TYPE: &'static str;

    /// Input type for starting the workflow
    type Input: Serialize + DeserializeOwned + Send + Sync;

    /// Output type when workflow completes successfully
    type Output: Serialize + DeserializeOwned + Send;

    /// Reject invalid input before any activity is dispatched
    fn validate(&self, _input: &Self::Input) -> Result<(), WorkflowError> {
        Ok(())
    }

    /// The single activity whose result drives the parallel phase
    fn leading_activity(&self, input: &Self::Input) -> Result<ActivityCall, WorkflowError>;

    /// Derive the parallel calls from the leading result
    ///
    /// `width` is the engine's configured fan-out width; how it is applied
    /// is up to the workflow. Returning an empty vector skips the phase.
    fn fan_out(
        &self,
        input: &Self::Input,
        leading: &ActivityResult,
        width: usize,
    ) -> Result<Vec<ActivityCall>, WorkflowError>;

    /// Combine the parallel results, given in the order `fan_out` returned
    /// their calls
    fn aggregate(
        &self,
        input: &Self::Input,
        results: &[ActivityResult],
    ) -> Result<Self::Output, WorkflowError>;
}
