//! Flow compiler validating definitions into executable flows.
//!
//! # Compilation Process
//!
//! 1. **Names**: state names are unique, distinct steps have distinct names
//! 2. **Splits**: every split has at least one branch
//! 3. **Transitions**: sources and targets name declared states; end states
//!    without transitions get an end transition
//! 4. **Graph**: the start state is resolved and every state is reachable
//!    from it or from a declared entry point

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use batchflow_core::Step;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use super::{Flow, FlowDefinition};
use crate::error::{FlowError, FlowResult};
use crate::state::State;
use crate::transition::{StateTransition, TransitionTable};

/// Tracing target for flow compilation.
const TRACING_TARGET: &str = "batchflow_runtime::compiler";

/// Validates flow definitions and turns them into [`Flow`]s.
///
/// Every configuration error is reported here, before the flow ever runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowCompiler;

impl FlowCompiler {
    /// Creates a new flow compiler.
    pub fn new() -> Self {
        Self
    }

    /// Compiles a flow definition into an executable flow.
    pub fn compile(&self, definition: FlowDefinition) -> FlowResult<Flow> {
        let FlowDefinition {
            name,
            states,
            mut transitions,
            start,
            entry_points,
        } = definition;

        if states.is_empty() {
            return Err(FlowError::InvalidDefinition(format!(
                "flow '{name}' has no states"
            )));
        }

        self.validate_names(&name, &states)?;
        self.validate_splits(&name, &states)?;

        let index: HashMap<&str, usize> = states
            .iter()
            .enumerate()
            .map(|(i, state)| (state.name(), i))
            .collect();

        self.validate_transitions(&name, &index, &transitions)?;

        for state in states.iter().filter(|s| s.is_end()) {
            if !transitions.iter().any(|t| t.state() == state.name()) {
                transitions.push(StateTransition::end(state.name(), "*"));
            }
        }

        if !transitions.iter().any(StateTransition::is_end) {
            return Err(FlowError::NoEndState { flow: name });
        }

        let graph = self.build_graph(&states, &index, &transitions);
        let start = self.resolve_start(&name, &states, &index, &graph, start, &entry_points)?;
        self.validate_reachability(&name, &states, &index, &graph, &start, &entry_points)?;

        tracing::debug!(
            target: TRACING_TARGET,
            flow = %name,
            start = %start,
            states = states.len(),
            transitions = transitions.len(),
            "Flow compiled"
        );

        let transitions = TransitionTable::new(transitions);
        Ok(Flow::from_parts(name, start, states, transitions, entry_points))
    }

    /// Checks state names and step names across nested flows.
    fn validate_names(&self, flow: &str, states: &[State]) -> FlowResult<()> {
        let mut names = HashSet::new();
        for state in states {
            if !names.insert(state.name()) {
                return Err(FlowError::DuplicateStateName {
                    flow: flow.to_owned(),
                    state: state.name().to_owned(),
                });
            }
        }

        let mut steps: HashMap<String, Arc<dyn Step>> = HashMap::new();
        for step in states.iter().flat_map(State::steps) {
            match steps.entry(step.name().to_owned()) {
                Entry::Occupied(existing) if !same_step(existing.get(), &step) => {
                    return Err(FlowError::DuplicateStepName {
                        flow: flow.to_owned(),
                        step: step.name().to_owned(),
                    });
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(step);
                }
            }
        }

        Ok(())
    }

    fn validate_splits(&self, flow: &str, states: &[State]) -> FlowResult<()> {
        for state in states {
            if let State::Split(split) = state
                && split.flows().is_empty()
            {
                return Err(FlowError::EmptySplit {
                    flow: flow.to_owned(),
                    state: split.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn validate_transitions(
        &self,
        flow: &str,
        index: &HashMap<&str, usize>,
        transitions: &[StateTransition],
    ) -> FlowResult<()> {
        for transition in transitions {
            if !index.contains_key(transition.state()) {
                return Err(FlowError::InvalidDefinition(format!(
                    "transition in flow '{flow}' leaves unknown state '{}'",
                    transition.state()
                )));
            }
            if let Some(target) = transition.next()
                && !index.contains_key(target)
            {
                return Err(FlowError::DanglingTransition {
                    flow: flow.to_owned(),
                    state: transition.state().to_owned(),
                    target: target.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Builds the state graph; node weights are indices into `states`.
    fn build_graph(
        &self,
        states: &[State],
        index: &HashMap<&str, usize>,
        transitions: &[StateTransition],
    ) -> DiGraph<usize, ()> {
        let mut graph = DiGraph::with_capacity(states.len(), transitions.len());
        let nodes: Vec<NodeIndex> = (0..states.len()).map(|i| graph.add_node(i)).collect();

        for transition in transitions {
            let Some(target) = transition.next() else {
                continue;
            };
            if let (Some(from), Some(to)) = (index.get(transition.state()), index.get(target)) {
                graph.update_edge(nodes[*from], nodes[*to], ());
            }
        }

        graph
    }

    /// Uses the declared start state, or the only state nothing leads to.
    fn resolve_start(
        &self,
        flow: &str,
        states: &[State],
        index: &HashMap<&str, usize>,
        graph: &DiGraph<usize, ()>,
        start: Option<String>,
        entry_points: &[String],
    ) -> FlowResult<String> {
        if let Some(start) = start {
            if !index.contains_key(start.as_str()) {
                return Err(FlowError::UnknownStartState {
                    flow: flow.to_owned(),
                    state: start,
                });
            }
            return Ok(start);
        }

        let candidates: Vec<String> = graph
            .node_indices()
            .filter(|node| {
                graph
                    .neighbors_directed(*node, Direction::Incoming)
                    .all(|from| from == *node)
            })
            .map(|node| states[graph[node]].name().to_owned())
            .filter(|name| !entry_points.contains(name))
            .collect();

        match candidates.len() {
            0 => Err(FlowError::NoStartState {
                flow: flow.to_owned(),
            }),
            1 => Ok(candidates.into_iter().next().unwrap_or_default()),
            _ => Err(FlowError::AmbiguousStartState {
                flow: flow.to_owned(),
                candidates,
            }),
        }
    }

    fn validate_reachability(
        &self,
        flow: &str,
        states: &[State],
        index: &HashMap<&str, usize>,
        graph: &DiGraph<usize, ()>,
        start: &str,
        entry_points: &[String],
    ) -> FlowResult<()> {
        let mut roots = Vec::with_capacity(entry_points.len() + 1);
        for name in std::iter::once(start).chain(entry_points.iter().map(String::as_str)) {
            let Some(i) = index.get(name) else {
                return Err(FlowError::InvalidDefinition(format!(
                    "entry point '{name}' of flow '{flow}' is not a state"
                )));
            };
            roots.push(NodeIndex::new(*i));
        }

        let mut reached = vec![false; states.len()];
        let mut dfs = Dfs::empty(graph);
        for root in roots {
            dfs.move_to(root);
            while let Some(node) = dfs.next(graph) {
                reached[graph[node]] = true;
            }
        }

        match reached.iter().position(|r| !r) {
            Some(i) => Err(FlowError::UnreachableState {
                flow: flow.to_owned(),
                state: states[i].name().to_owned(),
            }),
            None => Ok(()),
        }
    }
}

/// Compares steps by identity.
fn same_step(a: &Arc<dyn Step>, b: &Arc<dyn Step>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
