//! Fan-out and join of concurrent sub-flows.

use std::sync::Arc;

use super::executor::FlowExecutor;
use super::task::{TaskExecutor, submit};
use crate::error::FlowResult;
use crate::flow::Flow;
use crate::status::FlowExecutionStatus;

/// Tracing target for split coordination.
const TRACING_TARGET: &str = "batchflow_runtime::split";

/// Runs the branches of a split concurrently and merges their outcomes.
///
/// Every branch is submitted before any of them is awaited. A failing or
/// panicking branch does not cancel its siblings: its cause is recorded on
/// the job execution and it counts as `FAILED`. The aggregate is the worst
/// branch status.
#[derive(Debug, Clone, Default)]
pub struct SplitCoordinator {
    task_executor: Option<Arc<dyn TaskExecutor>>,
}

impl SplitCoordinator {
    /// Creates a coordinator using the executor's task executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a coordinator with its own task executor.
    pub fn with_task_executor(task_executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            task_executor: Some(task_executor),
        }
    }

    /// Runs `flows` concurrently on forks of `executor`.
    pub async fn run(
        &self,
        flows: &[Arc<Flow>],
        executor: &FlowExecutor,
    ) -> FlowResult<FlowExecutionStatus> {
        let task_executor = self
            .task_executor
            .clone()
            .unwrap_or_else(|| executor.task_executor().clone());

        let handles: Vec<_> = flows
            .iter()
            .map(|flow| {
                let flow = flow.clone();
                let mut branch = executor.fork();
                submit(&*task_executor, async move { flow.start(&mut branch).await })
            })
            .collect();

        tracing::debug!(
            target: TRACING_TARGET,
            branches = handles.len(),
            "Split branches submitted"
        );

        let mut statuses = Vec::with_capacity(handles.len());
        for (flow, handle) in flows.iter().zip(handles) {
            let status = match handle.await {
                Ok(Ok(execution)) => execution.status().clone(),
                Ok(Err(e)) | Err(e) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        flow = flow.name(),
                        error = %e,
                        "Split branch failed"
                    );
                    executor.add_failure(&e).await;
                    FlowExecutionStatus::Failed
                }
            };
            statuses.push(status);
        }

        let aggregate = FlowExecutionStatus::worst(&statuses).unwrap_or(FlowExecutionStatus::Completed);

        tracing::debug!(
            target: TRACING_TARGET,
            branches = statuses.len(),
            status = %aggregate,
            "Split branches joined"
        );

        Ok(aggregate)
    }
}
