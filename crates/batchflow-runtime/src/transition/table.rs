//! Transition table.

use std::collections::HashMap;

use super::StateTransition;

/// Tracing target for transition resolution.
const TRACING_TARGET: &str = "batchflow_runtime::transition";

/// The transitions of one flow, grouped by source state.
///
/// Within a source state, transitions are kept from most to least specific;
/// equally specific transitions keep their declaration order, so the first
/// declared one wins when several match.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    by_state: HashMap<String, Vec<StateTransition>>,
    len: usize,
}

impl TransitionTable {
    /// Builds a table from transitions in declaration order.
    pub fn new(transitions: impl IntoIterator<Item = StateTransition>) -> Self {
        let mut by_state: HashMap<String, Vec<StateTransition>> = HashMap::new();
        let mut len = 0;
        for transition in transitions {
            len += 1;
            by_state
                .entry(transition.state().to_owned())
                .or_default()
                .push(transition);
        }

        // Stable sort: ties keep declaration order.
        for transitions in by_state.values_mut() {
            transitions.sort_by_key(StateTransition::specificity);
        }

        Self { by_state, len }
    }

    /// Resolves the transition for `status` leaving `state`.
    ///
    /// Returns `None` when no pattern of the state matches.
    pub fn next(&self, state: &str, status: &str) -> Option<&StateTransition> {
        let found = self
            .by_state
            .get(state)?
            .iter()
            .find(|transition| transition.matches(status));

        tracing::trace!(
            target: TRACING_TARGET,
            state,
            status,
            transition = found.map(tracing::field::display),
            "Resolved transition"
        );

        found
    }

    /// Returns the transitions leaving `state`, most specific first.
    pub fn transitions_from(&self, state: &str) -> &[StateTransition] {
        self.by_state.get(state).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns whether `state` has any outgoing transition.
    pub fn has_transitions(&self, state: &str) -> bool {
        self.by_state.contains_key(state)
    }

    /// Returns every transition in the table.
    pub fn iter(&self) -> impl Iterator<Item = &StateTransition> {
        self.by_state.values().flatten()
    }

    /// Returns the number of transitions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
