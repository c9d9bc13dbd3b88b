//! Fluent flow builder.

use std::fmt;
use std::sync::Arc;

use batchflow_core::Step;

use super::{Flow, FlowCompiler, FlowDefinition};
use crate::engine::TaskExecutor;
use crate::error::{FlowError, FlowResult};
use crate::state::{
    DecisionState, EndState, FlowState, JobExecutionDecider, SplitState, State, StepState,
};
use crate::status::FlowExecutionStatus;
use crate::transition::StateTransition;

/// Something a flow can move to.
#[derive(Clone)]
pub enum Target {
    /// A step, run by a state named after it.
    Step(Arc<dyn Step>),
    /// A nested flow, run by a state named after it.
    Flow(Arc<Flow>),
    /// A decision state.
    Decision(String, Arc<dyn JobExecutionDecider>),
    /// A state declared elsewhere in the builder, by name.
    Name(String),
}

impl Target {
    /// Wraps a shared step.
    pub fn step(step: Arc<dyn Step>) -> Self {
        Self::Step(step)
    }

    /// Wraps a shared flow.
    pub fn flow(flow: Arc<Flow>) -> Self {
        Self::Flow(flow)
    }

    /// Creates a decision state called `name`.
    pub fn decision(name: impl Into<String>, decider: impl JobExecutionDecider + 'static) -> Self {
        Self::Decision(name.into(), Arc::new(decider))
    }

    fn into_state(self) -> Result<State, String> {
        match self {
            Self::Step(step) => Ok(StepState::new(step).into()),
            Self::Flow(flow) => Ok(FlowState::new(flow).into()),
            Self::Decision(name, decider) => Ok(DecisionState::new(name, decider).into()),
            Self::Name(name) => Err(name),
        }
    }
}

impl<S: Step + 'static> From<Arc<S>> for Target {
    fn from(step: Arc<S>) -> Self {
        Self::Step(step)
    }
}

impl From<Flow> for Target {
    fn from(flow: Flow) -> Self {
        Self::Flow(Arc::new(flow))
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(step) => f.debug_tuple("Step").field(&step.name()).finish(),
            Self::Flow(flow) => f.debug_tuple("Flow").field(&flow.name()).finish(),
            Self::Decision(name, _) => f.debug_tuple("Decision").field(name).finish(),
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
        }
    }
}

/// Builds a [`Flow`] one transition at a time.
///
/// The builder tracks a current state: [`next`](Self::next) links it to a
/// new state on `COMPLETED`, [`on`](Self::on) starts a transition for any
/// outcome pattern, and [`from`](Self::from) moves back to an earlier state
/// to declare more of its transitions.
///
/// When built, every state that is not an end state gets default exits:
/// a state without transitions ends the flow on `COMPLETED` and fails it on
/// anything else, and a state whose transitions cover neither `FAILED` nor
/// `COMPLETED` gets a `*` transition to the missing end.
///
/// ```
/// # use std::sync::Arc;
/// # use batchflow_runtime::prelude::*;
/// # fn flow(load: Arc<dyn Step>, report: Arc<dyn Step>, cleanup: Arc<dyn Step>) -> FlowResult<Flow> {
/// Flow::builder("import")
///     .start(Target::step(load))
///     .next(Target::step(report))
///     .on("FAILED")
///     .to(Target::step(cleanup))
///     .build()
/// # }
/// ```
#[derive(Debug)]
#[must_use = "a flow builder does nothing until built"]
pub struct FlowBuilder {
    name: String,
    states: Vec<State>,
    transitions: Vec<StateTransition>,
    start: Option<String>,
    current: Option<String>,
    ends: Vec<(FlowExecutionStatus, String)>,
    generated: usize,
    error: Option<FlowError>,
}

impl FlowBuilder {
    /// Creates a builder for a flow called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            start: None,
            current: None,
            ends: Vec::new(),
            generated: 0,
            error: None,
        }
    }

    /// Sets the start state and makes it current.
    pub fn start(mut self, target: impl Into<Target>) -> Self {
        let name = self.add(target.into());
        self.start = Some(name.clone());
        self.current = Some(name);
        self
    }

    /// Moves to `target` when the current state completes.
    ///
    /// Without a current state this is the same as [`start`](Self::start).
    pub fn next(mut self, target: impl Into<Target>) -> Self {
        let name = self.add(target.into());
        self.link("COMPLETED", &name);
        self.current = Some(name);
        self
    }

    /// Makes `target` the current state, adding it if it is new.
    pub fn from(mut self, target: impl Into<Target>) -> Self {
        let name = self.add(target.into());
        self.current = Some(name);
        self
    }

    /// Starts a transition from the current state for outcomes matching
    /// `pattern`.
    pub fn on(self, pattern: impl Into<String>) -> TransitionBuilder {
        TransitionBuilder {
            builder: self,
            pattern: pattern.into(),
        }
    }

    /// Runs `flows` concurrently once the current state completes.
    pub fn split(self, flows: Vec<Flow>) -> Self {
        self.split_state(flows, None)
    }

    /// Like [`split`](Self::split), running the branches on `task_executor`.
    pub fn split_with(self, flows: Vec<Flow>, task_executor: Arc<dyn TaskExecutor>) -> Self {
        self.split_state(flows, Some(task_executor))
    }

    /// Validates the flow and builds it.
    pub fn build(mut self) -> FlowResult<Flow> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        self.add_default_exits();

        let start = self
            .start
            .take()
            .or_else(|| self.states.first().map(|s| s.name().to_owned()));

        let definition = FlowDefinition {
            name: self.name,
            states: self.states,
            transitions: self.transitions,
            start,
            entry_points: Vec::new(),
        };

        FlowCompiler::new().compile(definition)
    }

    fn split_state(mut self, flows: Vec<Flow>, task_executor: Option<Arc<dyn TaskExecutor>>) -> Self {
        let name = self.generated_name("split");
        let mut split = SplitState::new(name, flows.into_iter().map(Arc::new).collect());
        if let Some(task_executor) = task_executor {
            split = split.with_task_executor(task_executor);
        }

        let name = self.insert(split.into());
        self.link("COMPLETED", &name);
        self.current = Some(name);
        self
    }

    /// Adds the state behind `target` unless it is already there and
    /// returns its name.
    fn add(&mut self, target: Target) -> String {
        match target.into_state() {
            Ok(state) => self.insert(state),
            Err(name) => name,
        }
    }

    fn insert(&mut self, state: State) -> String {
        let name = state.name().to_owned();
        match self.states.iter().find(|s| s.name() == name) {
            None => self.states.push(state),
            Some(existing) => {
                if let Some(error) = self.conflict(existing, &state) {
                    self.record(error);
                }
            }
        }
        name
    }

    /// Returns an error unless `existing` and `state` wrap the same thing.
    fn conflict(&self, existing: &State, state: &State) -> Option<FlowError> {
        let same = match (existing, state) {
            (State::Step(a), State::Step(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a.step()), Arc::as_ptr(b.step()))
            }
            (State::Flow(a), State::Flow(b)) => Arc::ptr_eq(a.flow(), b.flow()),
            (State::Decision(a), State::Decision(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a.decider()), Arc::as_ptr(b.decider()))
            }
            _ => false,
        };

        match (same, existing, state) {
            (true, ..) => None,
            (false, State::Step(_), State::Step(b)) => Some(FlowError::DuplicateStepName {
                flow: self.name.clone(),
                step: b.step().name().to_owned(),
            }),
            (false, ..) => Some(FlowError::DuplicateStateName {
                flow: self.name.clone(),
                state: state.name().to_owned(),
            }),
        }
    }

    /// Adds a transition from the current state, if there is one.
    fn link(&mut self, pattern: &str, next: &str) {
        if let Some(current) = &self.current {
            self.transitions
                .push(StateTransition::new(current.clone(), pattern, next));
        }
    }

    fn record(&mut self, error: FlowError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn generated_name(&mut self, kind: &str) -> String {
        let name = format!("{}.{kind}{}", self.name, self.generated);
        self.generated += 1;
        name
    }

    /// Adds a new end state.
    fn end_state(&mut self, status: FlowExecutionStatus, exit_code: Option<String>, abandon: bool) -> String {
        let kind = match status {
            FlowExecutionStatus::Failed => "fail",
            FlowExecutionStatus::Stopped => "stop",
            _ => "end",
        };
        let name = self.generated_name(kind);

        let mut state = EndState::new(name.clone(), status).with_abandon(abandon);
        if let Some(exit_code) = exit_code {
            state = state.with_exit_code(exit_code);
        }
        self.states.push(state.into());
        name
    }

    /// Returns the plain end state for `status`, adding it on first use.
    fn shared_end(&mut self, status: FlowExecutionStatus) -> String {
        if let Some((_, name)) = self.ends.iter().find(|(s, _)| *s == status) {
            return name.clone();
        }
        let name = self.end_state(status.clone(), None, false);
        self.ends.push((status, name.clone()));
        name
    }

    fn add_default_exits(&mut self) {
        let open: Vec<String> = self
            .states
            .iter()
            .filter(|s| !s.is_end())
            .map(|s| s.name().to_owned())
            .collect();

        for state in open {
            let outgoing = || self.transitions.iter().filter(|t| t.state() == state);
            let has_any = outgoing().next().is_some();
            let has_failed = outgoing().any(|t| t.matches("FAILED"));
            let has_completed = outgoing().any(|t| t.matches("COMPLETED"));

            if !has_any {
                let completed = self.shared_end(FlowExecutionStatus::Completed);
                let failed = self.shared_end(FlowExecutionStatus::Failed);
                self.transitions
                    .push(StateTransition::new(state.clone(), "COMPLETED", completed));
                self.transitions
                    .push(StateTransition::new(state, "*", failed));
                continue;
            }

            if !has_failed {
                let failed = self.shared_end(FlowExecutionStatus::Failed);
                self.transitions
                    .push(StateTransition::new(state.clone(), "*", failed));
            }
            if !has_completed {
                let completed = self.shared_end(FlowExecutionStatus::Completed);
                self.transitions
                    .push(StateTransition::new(state, "*", completed));
            }
        }
    }

    fn current_or_record(&mut self, pattern: &str) -> Option<String> {
        if self.current.is_none() {
            self.record(FlowError::InvalidDefinition(format!(
                "transition on '{pattern}' in flow '{}' has no source state",
                self.name
            )));
        }
        self.current.clone()
    }
}

/// A transition from the current state of a [`FlowBuilder`], waiting for
/// its target.
#[derive(Debug)]
#[must_use = "a transition is only added once its target is set"]
pub struct TransitionBuilder {
    builder: FlowBuilder,
    pattern: String,
}

impl TransitionBuilder {
    /// Moves to `target` and makes it the current state.
    pub fn to(mut self, target: impl Into<Target>) -> FlowBuilder {
        let next = self.builder.add(target.into());
        self.finish(&next);
        self.builder.current = Some(next);
        self.builder
    }

    /// Ends the flow with `COMPLETED`.
    pub fn end(mut self) -> FlowBuilder {
        let next = self.builder.shared_end(FlowExecutionStatus::Completed);
        self.finish(&next);
        self.builder
    }

    /// Ends the flow with `COMPLETED` and a custom exit code.
    pub fn end_with(mut self, exit_code: impl Into<String>) -> FlowBuilder {
        let next = self.builder.end_state(
            FlowExecutionStatus::Completed,
            Some(exit_code.into()),
            false,
        );
        self.finish(&next);
        self.builder
    }

    /// Ends the flow with `FAILED`.
    pub fn fail(mut self) -> FlowBuilder {
        let next = self.builder.shared_end(FlowExecutionStatus::Failed);
        self.finish(&next);
        self.builder
    }

    /// Ends the flow with `STOPPED`; a restart runs the same state again.
    pub fn stop(mut self) -> FlowBuilder {
        let next = self.builder.shared_end(FlowExecutionStatus::Stopped);
        self.finish(&next);
        self.builder
    }

    /// Ends the flow with `STOPPED`; a restart carries on at `target`.
    pub fn stop_and_restart(mut self, target: impl Into<Target>) -> FlowBuilder {
        let restart = self.builder.add(target.into());
        let stop = self
            .builder
            .end_state(FlowExecutionStatus::Stopped, None, true);
        self.finish(&stop);
        self.builder
            .transitions
            .push(StateTransition::new(stop, "*", restart));
        self.builder
    }

    fn finish(&mut self, next: &str) {
        if let Some(current) = self.builder.current_or_record(&self.pattern) {
            self.builder.transitions.push(StateTransition::new(
                current,
                self.pattern.clone(),
                next,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use batchflow_test::StubStep;

    use super::*;

    fn end_state<'a>(flow: &'a Flow, name: &str) -> &'a EndState {
        match flow.state(name) {
            Some(State::End(state)) => state,
            other => panic!("expected end state '{name}', found {other:?}"),
        }
    }

    fn target_of<'a>(flow: &'a Flow, state: &str, status: &str) -> Option<&'a str> {
        flow.transitions()
            .next(state, status)
            .and_then(StateTransition::next)
    }

    #[test]
    fn states_get_default_exits() {
        let flow = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .next(Arc::new(StubStep::new("b")))
            .build()
            .unwrap();

        assert_eq!(flow.start_state(), "a");
        assert_eq!(target_of(&flow, "a", "COMPLETED"), Some("b"));

        let failed = target_of(&flow, "a", "FAILED").unwrap();
        assert_eq!(end_state(&flow, failed).status(), &FlowExecutionStatus::Failed);

        let completed = target_of(&flow, "b", "COMPLETED").unwrap();
        assert_eq!(end_state(&flow, completed).status(), &FlowExecutionStatus::Completed);
        assert_eq!(target_of(&flow, "b", "ANYTHING"), Some(failed));
    }

    #[test]
    fn generated_end_states_are_shared() {
        let flow = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .on("FAILED")
            .fail()
            .from("a")
            .on("HALT")
            .fail()
            .build()
            .unwrap();

        assert_eq!(target_of(&flow, "a", "FAILED"), Some("job.fail0"));
        assert_eq!(target_of(&flow, "a", "HALT"), Some("job.fail0"));
        assert_eq!(target_of(&flow, "a", "COMPLETED"), Some("job.end1"));
    }

    #[test]
    fn end_with_sets_the_exit_code() {
        let flow = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .on("COMPLETED")
            .end_with("DONE_EARLY")
            .build()
            .unwrap();

        let name = target_of(&flow, "a", "COMPLETED").unwrap();
        let end = end_state(&flow, name);
        assert_eq!(end.status(), &FlowExecutionStatus::Completed);
        assert_eq!(end.exit_code(), "DONE_EARLY");
    }

    #[test]
    fn stop_and_restart_links_the_stop_state() {
        let flow = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .on("COMPLETED")
            .stop_and_restart(Arc::new(StubStep::new("b")))
            .build()
            .unwrap();

        let stop = target_of(&flow, "a", "COMPLETED").unwrap();
        let state = end_state(&flow, stop);
        assert!(state.is_restartable());
        assert!(state.is_abandon());
        assert_eq!(target_of(&flow, stop, "COMPLETED"), Some("b"));
    }

    #[test]
    fn split_follows_the_current_state() {
        let flow = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .split(vec![
                Flow::builder("left")
                    .start(Arc::new(StubStep::new("l")))
                    .build()
                    .unwrap(),
                Flow::builder("right")
                    .start(Arc::new(StubStep::new("r")))
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap();

        assert_eq!(target_of(&flow, "a", "COMPLETED"), Some("job.split0"));
        assert!(matches!(flow.state("job.split0"), Some(State::Split(s)) if s.flows().len() == 2));
        assert_eq!(flow.step_names(), vec!["a", "l", "r"]);
    }

    #[test]
    fn reusing_a_step_is_allowed() {
        let a = Arc::new(StubStep::new("a"));
        let flow = Flow::builder("job")
            .start(a.clone())
            .on("RETRY")
            .to(a)
            .build();
        assert!(flow.is_ok());
    }

    #[test]
    fn distinct_steps_need_distinct_names() {
        let result = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .next(Arc::new(StubStep::new("a")))
            .build();
        assert!(matches!(result, Err(FlowError::DuplicateStepName { ref step, .. }) if step == "a"));
    }

    #[test]
    fn transition_needs_a_source_state() {
        let result = Flow::builder("job")
            .on("*")
            .to(Arc::new(StubStep::new("a")))
            .build();
        assert!(matches!(result, Err(FlowError::InvalidDefinition(_))));
    }

    #[test]
    fn unknown_target_name_is_dangling() {
        let result = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .on("FAILED")
            .to("missing")
            .build();
        assert!(matches!(
            result,
            Err(FlowError::DanglingTransition { ref target, .. }) if target == "missing"
        ));
    }

    #[test]
    fn empty_builder_is_invalid() {
        let result = Flow::builder("job").build();
        assert!(matches!(result, Err(FlowError::InvalidDefinition(_))));
    }
}
