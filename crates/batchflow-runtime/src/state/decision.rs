//! Decision state.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use batchflow_core::{BoxError, JobExecution, StepExecution};

use crate::engine::FlowExecutor;
use crate::error::FlowResult;
use crate::status::FlowExecutionStatus;

/// Tracing target for decisions.
const TRACING_TARGET: &str = "batchflow_runtime::decision";

/// Computes a flow outcome from the execution so far.
///
/// Implemented for plain functions and closures with the matching signature.
#[async_trait]
pub trait JobExecutionDecider: Send + Sync {
    /// Returns the outcome given the job execution and the last step
    /// execution of the current branch, if any.
    async fn decide(
        &self,
        job_execution: &JobExecution,
        step_execution: Option<&StepExecution>,
    ) -> Result<FlowExecutionStatus, BoxError>;
}

#[async_trait]
impl<F> JobExecutionDecider for F
where
    F: Fn(&JobExecution, Option<&StepExecution>) -> Result<FlowExecutionStatus, BoxError>
        + Send
        + Sync,
{
    async fn decide(
        &self,
        job_execution: &JobExecution,
        step_execution: Option<&StepExecution>,
    ) -> Result<FlowExecutionStatus, BoxError> {
        self(job_execution, step_execution)
    }
}

/// State that delegates the outcome to a decider; no step runs.
///
/// A decider error does not escape the flow: it is recorded on the job
/// execution and the outcome becomes `FAILED`.
#[derive(Clone)]
pub struct DecisionState {
    name: String,
    decider: Arc<dyn JobExecutionDecider>,
}

impl DecisionState {
    /// Creates a decision state.
    pub fn new(name: impl Into<String>, decider: Arc<dyn JobExecutionDecider>) -> Self {
        Self {
            name: name.into(),
            decider,
        }
    }

    /// Returns the state name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the decider.
    #[inline]
    pub fn decider(&self) -> &Arc<dyn JobExecutionDecider> {
        &self.decider
    }

    pub(crate) async fn handle(&self, executor: &mut FlowExecutor) -> FlowResult<FlowExecutionStatus> {
        let job_execution = executor.job_execution().await;
        match self
            .decider
            .decide(&job_execution, executor.step_execution())
            .await
        {
            Ok(status) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    state = %self.name,
                    status = %status,
                    "Decision made"
                );
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    state = %self.name,
                    error = %e,
                    "Decider failed"
                );
                executor
                    .add_failure(format!("decision '{}' failed: {e}", self.name))
                    .await;
                Ok(FlowExecutionStatus::Failed)
            }
        }
    }
}

impl fmt::Debug for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionState")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
