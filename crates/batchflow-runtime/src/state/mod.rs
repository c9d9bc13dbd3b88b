//! States a flow is made of.
//!
//! A flow is a graph of named [`State`]s. Handling a state yields an outcome
//! ([`FlowExecutionStatus`]) that the flow matches against its transitions to
//! find the next state:
//! - [`StepState`]: runs one step, the outcome is its exit code
//! - [`DecisionState`]: asks a [`JobExecutionDecider`] for the outcome
//! - [`SplitState`]: runs sub-flows concurrently, the outcome is the worst one
//! - [`EndState`]: returns a fixed status
//! - [`FlowState`]: runs a nested flow, the outcome is its terminal status

mod decision;
mod end;
mod flow;
mod split;
mod step;

use std::sync::Arc;

use batchflow_core::Step;
use derive_more::From;

pub use self::decision::{DecisionState, JobExecutionDecider};
pub use self::end::EndState;
pub use self::flow::FlowState;
pub use self::split::SplitState;
pub use self::step::StepState;
use crate::engine::FlowExecutor;
use crate::error::FlowResult;
use crate::status::FlowExecutionStatus;

/// A named node of a flow.
#[derive(Debug, Clone, From)]
pub enum State {
    /// Runs a step.
    Step(StepState),
    /// Computes the outcome from the execution so far.
    Decision(DecisionState),
    /// Runs sub-flows concurrently.
    Split(SplitState),
    /// Ends the flow with a fixed status.
    End(EndState),
    /// Runs a nested flow.
    Flow(FlowState),
}

impl State {
    /// Returns the state name, unique within its flow.
    pub fn name(&self) -> &str {
        match self {
            Self::Step(state) => state.name(),
            Self::Decision(state) => state.name(),
            Self::Split(state) => state.name(),
            Self::End(state) => state.name(),
            Self::Flow(state) => state.name(),
        }
    }

    /// Returns whether this is an end state.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End(_))
    }

    /// Handles the state and returns its outcome.
    pub async fn handle(&self, executor: &mut FlowExecutor) -> FlowResult<FlowExecutionStatus> {
        match self {
            Self::Step(state) => state.handle(executor).await,
            Self::Decision(state) => state.handle(executor).await,
            Self::Split(state) => state.handle(executor).await,
            Self::End(state) => state.handle(executor).await,
            Self::Flow(state) => state.handle(executor).await,
        }
    }

    /// Returns the steps run by this state, including nested flows.
    pub fn steps(&self) -> Vec<Arc<dyn Step>> {
        match self {
            Self::Step(state) => vec![state.step().clone()],
            Self::Split(state) => state.flows().iter().flat_map(|f| f.steps()).collect(),
            Self::Flow(state) => state.flow().steps(),
            Self::Decision(_) | Self::End(_) => Vec::new(),
        }
    }
}
