// Greeting workflow
//
// Greets the caller once, then greets the result of that greeting in a
// parallel phase and joins the parallel values.

use serde::{Deserialize, Serialize};
use tracing::info;
use weft_durable::prelude::*;

use crate::activities::{GreetActivity, GreetInput, GreetOutput, ParallelGreetActivity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetingInput {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetingOutput {
    pub value: String,
}

pub struct GreetingWorkflow;

impl Workflow for GreetingWorkflow {
    const TYPE: &'static str = "greeting";
    type Input = GreetingInput;
    type Output = GreetingOutput;

    fn validate(&self, input: &GreetingInput) -> Result<(), WorkflowError> {
        if input.name.trim().is_empty() {
            return Err(WorkflowError::new("name must not be empty").with_code("EMPTY_NAME"));
        }
        Ok(())
    }

    fn leading_activity(&self, input: &GreetingInput) -> Result<ActivityCall, WorkflowError> {
        ActivityCall::of::<GreetActivity>(&GreetInput {
            name: input.name.clone(),
        })
    }

    fn fan_out(
        &self,
        _input: &GreetingInput,
        leading: &ActivityResult,
        width: usize,
    ) -> Result<Vec<ActivityCall>, WorkflowError> {
        let greeted: GreetOutput = leading.decode()?;
        info!(count = width, "starting parallel greetings");

        (0..width)
            .map(|_| {
                ActivityCall::of::<ParallelGreetActivity>(&GreetInput {
                    name: greeted.value.clone(),
                })
            })
            .collect()
    }

    fn aggregate(
        &self,
        _input: &GreetingInput,
        results: &[ActivityResult],
    ) -> Result<GreetingOutput, WorkflowError> {
        let mut value = String::new();
        for result in results {
            let greeted: GreetOutput = result.decode()?;
            value.push('+');
            value.push_str(&greeted.value);
        }
        Ok(GreetingOutput { value })
    }
}
