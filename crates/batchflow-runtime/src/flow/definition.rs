//! Declarative flow definition.

use derive_builder::Builder;

use super::{Flow, FlowCompiler};
use crate::error::FlowResult;
use crate::state::State;
use crate::transition::StateTransition;

/// States and transitions of a flow before validation.
///
/// Compile a definition into a [`Flow`] with [`FlowDefinition::compile`].
#[derive(Debug, Clone, Builder)]
#[builder(
    pattern = "owned",
    setter(into, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct FlowDefinition {
    /// Name of the flow.
    pub name: String,

    /// States in declaration order.
    #[builder(default)]
    pub states: Vec<State>,

    /// Transitions in declaration order.
    #[builder(default)]
    pub transitions: Vec<StateTransition>,

    /// Start state; inferred from the transitions when not set.
    #[builder(default, setter(into, strip_option, prefix = "with"))]
    pub start: Option<String>,

    /// States that [`Flow::resume`] may start from besides the start state.
    #[builder(default)]
    pub entry_points: Vec<String>,
}

impl FlowDefinitionBuilder {
    /// Appends a state.
    pub fn state(mut self, state: impl Into<State>) -> Self {
        self.states.get_or_insert_with(Vec::new).push(state.into());
        self
    }

    /// Appends a transition.
    pub fn transition(mut self, transition: StateTransition) -> Self {
        self.transitions
            .get_or_insert_with(Vec::new)
            .push(transition);
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(str::is_empty) {
            return Err("flow name must not be empty".into());
        }
        Ok(())
    }
}

impl FlowDefinition {
    /// Returns a builder for a flow definition.
    pub fn builder() -> FlowDefinitionBuilder {
        FlowDefinitionBuilder::default()
    }

    /// Validates the definition and builds the flow.
    pub fn compile(self) -> FlowResult<Flow> {
        FlowCompiler::new().compile(self)
    }
}
