//! Nested flow state.

use std::sync::Arc;

use crate::engine::FlowExecutor;
use crate::error::FlowResult;
use crate::flow::Flow;
use crate::status::FlowExecutionStatus;

/// State that runs a nested flow to completion.
///
/// The outcome is the nested flow's terminal status. Steps of the nested
/// flow are visible through the enclosing flow's step lookup.
#[derive(Debug, Clone)]
pub struct FlowState {
    name: String,
    flow: Arc<Flow>,
}

impl FlowState {
    /// Creates a state named after the flow.
    pub fn new(flow: Arc<Flow>) -> Self {
        Self {
            name: flow.name().to_owned(),
            flow,
        }
    }

    /// Creates a state with an explicit name.
    pub fn with_name(name: impl Into<String>, flow: Arc<Flow>) -> Self {
        Self {
            name: name.into(),
            flow,
        }
    }

    /// Returns the state name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the nested flow.
    #[inline]
    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    pub(crate) async fn handle(&self, executor: &mut FlowExecutor) -> FlowResult<FlowExecutionStatus> {
        let execution = self.flow.start(executor).await?;
        Ok(execution.status().clone())
    }
}
