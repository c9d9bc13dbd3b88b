//! Step state.

use std::fmt;
use std::sync::Arc;

use batchflow_core::Step;

use crate::engine::FlowExecutor;
use crate::error::FlowResult;
use crate::status::FlowExecutionStatus;

/// State that runs one step.
///
/// The outcome is the exit code of the step execution. A step that already
/// completed in an earlier execution of the job instance is skipped and its
/// previous exit code is returned.
#[derive(Clone)]
pub struct StepState {
    name: String,
    step: Arc<dyn Step>,
}

impl StepState {
    /// Creates a state named after the step.
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self {
            name: step.name().to_owned(),
            step,
        }
    }

    /// Creates a state with an explicit name.
    pub fn with_name(name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }

    /// Returns the state name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the wrapped step.
    #[inline]
    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }

    pub(crate) async fn handle(&self, executor: &mut FlowExecutor) -> FlowResult<FlowExecutionStatus> {
        // A previous step that failed or stopped was handled by this
        // transition, so a restart must not run it again.
        executor.abandon_step_execution().await?;
        let exit_status = executor.execute_step(&*self.step).await?;
        Ok(FlowExecutionStatus::from(&exit_status))
    }
}

impl fmt::Debug for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepState")
            .field("name", &self.name)
            .field("step", &self.step.name())
            .finish()
    }
}
