//! Flow error types.

use batchflow_core::CoreError;
use thiserror::Error;

/// Result type for flow operations.
pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;

/// Errors that can occur while building or running a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Two states in one flow share a name.
    #[error("duplicate state name '{state}' in flow '{flow}'")]
    DuplicateStateName {
        /// Name of the flow.
        flow: String,
        /// Name of the duplicated state.
        state: String,
    },

    /// Two distinct steps are registered under one name.
    #[error("duplicate step name '{step}' in flow '{flow}'")]
    DuplicateStepName {
        /// Name of the flow.
        flow: String,
        /// Name of the duplicated step.
        step: String,
    },

    /// A transition targets a state that does not exist.
    #[error("transition from '{state}' in flow '{flow}' targets unknown state '{target}'")]
    DanglingTransition {
        /// Name of the flow.
        flow: String,
        /// Source state of the transition.
        state: String,
        /// Missing target state.
        target: String,
    },

    /// The declared start state does not exist.
    #[error("unknown start state '{state}' in flow '{flow}'")]
    UnknownStartState {
        /// Name of the flow.
        flow: String,
        /// Requested start state.
        state: String,
    },

    /// More than one state could be the start state.
    #[error("flow '{flow}' has several candidate start states: {candidates:?}")]
    AmbiguousStartState {
        /// Name of the flow.
        flow: String,
        /// States without incoming transitions.
        candidates: Vec<String>,
    },

    /// No state could be the start state.
    #[error("flow '{flow}' has no start state")]
    NoStartState {
        /// Name of the flow.
        flow: String,
    },

    /// The flow can never finish.
    #[error("flow '{flow}' has no end state or end transition")]
    NoEndState {
        /// Name of the flow.
        flow: String,
    },

    /// A split state has no branches.
    #[error("split state '{state}' in flow '{flow}' has no branches")]
    EmptySplit {
        /// Name of the flow.
        flow: String,
        /// Name of the split state.
        state: String,
    },

    /// A state cannot be reached from the start state or an entry point.
    #[error("state '{state}' in flow '{flow}' is unreachable")]
    UnreachableState {
        /// Name of the flow.
        flow: String,
        /// Name of the unreachable state.
        state: String,
    },

    /// Flow definition is invalid.
    #[error("invalid flow definition: {0}")]
    InvalidDefinition(String),

    /// No transition matches the outcome of a state.
    #[error("no transition in flow '{flow}' matches status '{status}' of state '{state}'")]
    NoMatchingTransition {
        /// Name of the flow.
        flow: String,
        /// Name of the state.
        state: String,
        /// Outcome that did not match.
        status: String,
    },

    /// A state failed with an error that could not be turned into an outcome.
    #[error("state '{state}' in flow '{flow}' failed: {source}")]
    StateFailed {
        /// Name of the flow.
        flow: String,
        /// Name of the state.
        state: String,
        /// Underlying error.
        #[source]
        source: Box<FlowError>,
    },

    /// Some partitions of a partitioned step did not succeed.
    #[error("{failed} of {total} partitions of step '{step}' were unsuccessful")]
    PartitionFailed {
        /// Name of the partitioned step.
        step: String,
        /// Number of unsuccessful partitions.
        failed: usize,
        /// Number of partitions that ran.
        total: usize,
    },

    /// A concurrently running branch or partition panicked.
    #[error("branch panicked: {0}")]
    BranchPanicked(String),

    /// The execution was interrupted.
    #[error("execution interrupted: {0}")]
    Interrupted(String),

    /// Execution record or repository error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl FlowError {
    /// Wraps this error as the failure of a state.
    pub fn in_state(self, flow: &str, state: &str) -> Self {
        match self {
            Self::StateFailed { .. } => self,
            other => Self::StateFailed {
                flow: flow.to_owned(),
                state: state.to_owned(),
                source: Box::new(other),
            },
        }
    }

    /// Returns whether this error was raised while validating a definition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateStateName { .. }
                | Self::DuplicateStepName { .. }
                | Self::DanglingTransition { .. }
                | Self::UnknownStartState { .. }
                | Self::AmbiguousStartState { .. }
                | Self::NoStartState { .. }
                | Self::NoEndState { .. }
                | Self::EmptySplit { .. }
                | Self::UnreachableState { .. }
                | Self::InvalidDefinition(_)
        )
    }
}
