//! Split state.

use std::sync::Arc;

use crate::engine::{FlowExecutor, SplitCoordinator, TaskExecutor};
use crate::error::FlowResult;
use crate::flow::Flow;
use crate::status::FlowExecutionStatus;

/// State that runs several flows concurrently.
///
/// The outcome is the worst terminal status among the branches.
#[derive(Debug, Clone)]
pub struct SplitState {
    name: String,
    flows: Vec<Arc<Flow>>,
    coordinator: SplitCoordinator,
}

impl SplitState {
    /// Creates a split running on the flow executor's task executor.
    pub fn new(name: impl Into<String>, flows: Vec<Arc<Flow>>) -> Self {
        Self {
            name: name.into(),
            flows,
            coordinator: SplitCoordinator::new(),
        }
    }

    /// Runs the branches on `task_executor` instead.
    #[must_use]
    pub fn with_task_executor(mut self, task_executor: Arc<dyn TaskExecutor>) -> Self {
        self.coordinator = SplitCoordinator::with_task_executor(task_executor);
        self
    }

    /// Returns the state name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the branches.
    #[inline]
    pub fn flows(&self) -> &[Arc<Flow>] {
        &self.flows
    }

    pub(crate) async fn handle(&self, executor: &mut FlowExecutor) -> FlowResult<FlowExecutionStatus> {
        self.coordinator.run(&self.flows, executor).await
    }
}
