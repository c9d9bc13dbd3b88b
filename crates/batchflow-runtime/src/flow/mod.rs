//! Flow definitions and the flow run loop.
//!
//! A [`Flow`] is an immutable graph of named states plus a transition table.
//! It is built once, either with the fluent [`FlowBuilder`] or from a
//! [`FlowDefinition`], validated by the [`FlowCompiler`], and can then run
//! against any number of job executions.

mod builder;
mod compiler;
mod definition;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use batchflow_core::Step;
use futures::future::BoxFuture;

pub use self::builder::{FlowBuilder, Target, TransitionBuilder};
pub use self::compiler::FlowCompiler;
pub use self::definition::{FlowDefinition, FlowDefinitionBuilder, FlowDefinitionBuilderError};
use crate::engine::FlowExecutor;
use crate::error::{FlowError, FlowResult};
use crate::state::State;
use crate::status::{FlowExecution, FlowExecutionStatus};
use crate::transition::TransitionTable;

/// Tracing target for flow execution.
const TRACING_TARGET: &str = "batchflow_runtime::flow";

/// A validated, immutable graph of states.
///
/// States are stored in declaration order and looked up by name, so cycles
/// in the graph are plain data.
#[derive(Debug)]
pub struct Flow {
    name: String,
    start: String,
    states: Vec<State>,
    index: HashMap<String, usize>,
    transitions: TransitionTable,
    entry_points: Vec<String>,
}

impl Flow {
    /// Returns a fluent builder for a flow called `name`.
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        start: String,
        states: Vec<State>,
        transitions: TransitionTable,
        entry_points: Vec<String>,
    ) -> Self {
        let index = states
            .iter()
            .enumerate()
            .map(|(i, state)| (state.name().to_owned(), i))
            .collect();

        Self {
            name,
            start,
            states,
            index,
            transitions,
            entry_points,
        }
    }

    /// Returns the flow name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the start state.
    #[inline]
    pub fn start_state(&self) -> &str {
        &self.start
    }

    /// Returns the states declared as alternate entry points.
    #[inline]
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// Returns the states in declaration order.
    #[inline]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Returns the state with the given name.
    pub fn state(&self, name: &str) -> Option<&State> {
        self.index.get(name).map(|i| &self.states[*i])
    }

    /// Returns the transition table.
    #[inline]
    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    /// Returns every step of the flow, including those of nested flows and
    /// split branches, in declaration order.
    pub fn steps(&self) -> Vec<Arc<dyn Step>> {
        let mut seen = HashSet::new();
        self.states
            .iter()
            .flat_map(State::steps)
            .filter(|step| seen.insert(step.name().to_owned()))
            .collect()
    }

    /// Returns the names of every step of the flow, in declaration order.
    pub fn step_names(&self) -> Vec<String> {
        self.steps().iter().map(|s| s.name().to_owned()).collect()
    }

    /// Returns the step with the given name, searching nested flows too.
    pub fn step(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps().into_iter().find(|s| s.name() == name)
    }

    /// Runs the flow from its start state.
    pub fn start<'a>(
        &'a self,
        executor: &'a mut FlowExecutor,
    ) -> BoxFuture<'a, FlowResult<FlowExecution>> {
        self.resume(executor, &self.start)
    }

    /// Runs the flow from the named state until it reaches an end.
    ///
    /// The stop flag of the job execution is checked between states: once a
    /// state returns and a stop was requested, the flow ends `STOPPED`
    /// instead of looking up the next transition. A running state is never
    /// interrupted. On every error the executor is closed `UNKNOWN` at the
    /// state where the flow broke off.
    pub fn resume<'a>(
        &'a self,
        executor: &'a mut FlowExecutor,
        state_name: &'a str,
    ) -> BoxFuture<'a, FlowResult<FlowExecution>> {
        Box::pin(async move {
            let mut state = self
                .state(state_name)
                .ok_or_else(|| FlowError::UnknownStartState {
                    flow: self.name.clone(),
                    state: state_name.to_owned(),
                })?;

            tracing::debug!(
                target: TRACING_TARGET,
                flow = %self.name,
                state = state.name(),
                "Flow started"
            );

            loop {
                let status = match state.handle(executor).await {
                    Ok(status) => status,
                    Err(e) => {
                        let error = e.in_state(&self.name, state.name());
                        return Err(self.abort(executor, state, error));
                    }
                };

                tracing::debug!(
                    target: TRACING_TARGET,
                    flow = %self.name,
                    state = state.name(),
                    status = %status,
                    "State handled"
                );

                if status == FlowExecutionStatus::Stopped {
                    return Ok(self.finish(executor, state, status));
                }

                if executor.is_stopping().await {
                    tracing::info!(
                        target: TRACING_TARGET,
                        flow = %self.name,
                        state = state.name(),
                        "Stop requested, flow stopped"
                    );
                    return Ok(self.finish(executor, state, FlowExecutionStatus::Stopped));
                }

                let transition = self.transitions.next(state.name(), status.name());
                match transition {
                    Some(transition) => match transition.next() {
                        Some(next) => match self.state(next) {
                            Some(next) => state = next,
                            None => {
                                let error = FlowError::DanglingTransition {
                                    flow: self.name.clone(),
                                    state: state.name().to_owned(),
                                    target: next.to_owned(),
                                };
                                return Err(self.abort(executor, state, error));
                            }
                        },
                        None => return Ok(self.finish(executor, state, status)),
                    },
                    None if state.is_end() => return Ok(self.finish(executor, state, status)),
                    None => {
                        let error = FlowError::NoMatchingTransition {
                            flow: self.name.clone(),
                            state: state.name().to_owned(),
                            status: status.name().to_owned(),
                        };
                        return Err(self.abort(executor, state, error));
                    }
                }
            }
        })
    }

    fn abort(&self, executor: &mut FlowExecutor, state: &State, error: FlowError) -> FlowError {
        tracing::debug!(
            target: TRACING_TARGET,
            flow = %self.name,
            state = state.name(),
            error = %error,
            "Flow aborted"
        );
        executor.close(FlowExecution::new(state.name(), FlowExecutionStatus::Unknown));
        error
    }

    fn finish(
        &self,
        executor: &mut FlowExecutor,
        state: &State,
        status: FlowExecutionStatus,
    ) -> FlowExecution {
        tracing::debug!(
            target: TRACING_TARGET,
            flow = %self.name,
            state = state.name(),
            status = %status,
            "Flow finished"
        );
        let result = FlowExecution::new(state.name(), status);
        executor.close(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use batchflow_core::{
        BatchStatus, InMemoryJobRepository, JobExecution, JobParameters, JobRepository,
    };
    use batchflow_test::{FailingStep, SleepStep, StubStep, TerminateOnlyStep};

    use super::*;
    use crate::engine::{SyncTaskExecutor, TaskExecutor, TokioTaskExecutor};
    use crate::state::{EndState, StepState};
    use crate::transition::StateTransition;

    async fn executor_with(task_executor: Arc<dyn TaskExecutor>) -> FlowExecutor {
        let repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        FlowExecutor::new(job, repo, task_executor)
    }

    async fn executor() -> FlowExecutor {
        executor_with(Arc::new(SyncTaskExecutor)).await
    }

    async fn step_names(executor: &FlowExecutor) -> Vec<String> {
        let job: JobExecution = executor.job_execution().await;
        job.step_names().into_iter().map(str::to_owned).collect()
    }

    #[tokio::test]
    async fn explicit_failure_branch_continues() {
        let a = Arc::new(StubStep::new("a"));
        let b = Arc::new(FailingStep::new("b"));
        let c = Arc::new(StubStep::new("c"));

        let flow = Flow::builder("job")
            .start(a)
            .next(b)
            .on("FAILED")
            .to(c)
            .build()
            .unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await.unwrap();

        assert_eq!(result.status(), &FlowExecutionStatus::Completed);
        assert_eq!(step_names(&executor).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unmatched_outcome_is_an_error() {
        let definition = FlowDefinition::builder()
            .with_name("job")
            .state(StepState::new(Arc::new(FailingStep::new("a"))))
            .state(EndState::new("end", FlowExecutionStatus::Completed))
            .transition(StateTransition::new("a", "COMPLETED", "end"))
            .build()
            .unwrap();
        let flow = definition.compile().unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await;
        assert!(matches!(
            result,
            Err(FlowError::NoMatchingTransition { ref state, ref status, .. })
                if state == "a" && status == "FAILED"
        ));

        let closed = executor.result().unwrap();
        assert_eq!(closed.name(), "a");
        assert_eq!(closed.status(), &FlowExecutionStatus::Unknown);
    }

    #[tokio::test]
    async fn end_transition_reports_the_outcome() {
        let definition = FlowDefinition::builder()
            .with_name("job")
            .state(StepState::new(Arc::new(StubStep::new("a").with_exit_code("ONGOING"))))
            .transition(StateTransition::end("a", "*"))
            .build()
            .unwrap();
        let flow = definition.compile().unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.name(), "a");
        assert_eq!(result.status().name(), "ONGOING");
        assert_eq!(executor.result(), Some(&result));
    }

    #[tokio::test]
    async fn stop_request_ends_the_flow_between_states() {
        let a = Arc::new(StubStep::new("a"));
        let b = Arc::new(StubStep::new("b"));
        let flow = Flow::builder("job").start(a).next(b.clone()).build().unwrap();

        let mut executor = executor().await;
        executor.job_execution().await.stop_token().cancel();

        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Stopped);
        assert_eq!(result.name(), "a");
        assert_eq!(step_names(&executor).await, vec!["a"]);
        assert_eq!(b.executions(), 0);
    }

    #[tokio::test]
    async fn stop_request_wins_over_a_failed_state() {
        let a = Arc::new(FailingStep::new("a"));
        let b = Arc::new(StubStep::new("b"));
        let flow = Flow::builder("job")
            .start(a)
            .on("*")
            .to(b.clone())
            .build()
            .unwrap();

        let mut executor = executor().await;
        executor.job_execution().await.stop_token().cancel();

        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Stopped);
        assert_eq!(result.name(), "a");
        assert_eq!(b.executions(), 0);
    }

    #[tokio::test]
    async fn terminate_only_step_stops_the_flow() {
        let a = Arc::new(TerminateOnlyStep::new("a"));
        let b = Arc::new(StubStep::new("b"));
        let flow = Flow::builder("job")
            .start(a)
            .on("*")
            .to(b.clone())
            .build()
            .unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Stopped);
        assert_eq!(b.executions(), 0);
        assert_eq!(
            executor.job_execution().await.status(),
            BatchStatus::Stopping
        );
    }

    #[tokio::test]
    async fn loops_rerun_steps() {
        let step = Arc::new(StubStep::new("a"));
        let decider = |job: &JobExecution, _: Option<&batchflow_core::StepExecution>| {
            let runs = job.step_executions().len();
            Ok::<_, batchflow_core::BoxError>(if runs < 3 {
                FlowExecutionStatus::new("AGAIN")
            } else {
                FlowExecutionStatus::Completed
            })
        };

        let flow = Flow::builder("job")
            .start(step.clone())
            .next(Target::decision("check", decider))
            .on("AGAIN")
            .to("a")
            .from("check")
            .on("COMPLETED")
            .end()
            .build()
            .unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Completed);
        assert_eq!(step.executions(), 3);
    }

    #[tokio::test]
    async fn decider_error_becomes_failed_outcome() {
        let decider = |_: &JobExecution, _: Option<&batchflow_core::StepExecution>| {
            Err::<FlowExecutionStatus, batchflow_core::BoxError>("no answer".into())
        };
        let recovery = Arc::new(StubStep::new("recover"));

        let flow = Flow::builder("job")
            .start(Arc::new(StubStep::new("a")))
            .next(Target::decision("decide", decider))
            .on("FAILED")
            .to(recovery.clone())
            .build()
            .unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Completed);
        assert_eq!(recovery.executions(), 1);

        let job = executor.job_execution().await;
        assert!(job.failures().iter().any(|f| f.contains("no answer")));
    }

    #[tokio::test]
    async fn nested_flow_steps_are_flattened() {
        let inner = Flow::builder("inner")
            .start(Arc::new(StubStep::new("x")))
            .next(Arc::new(StubStep::new("y")))
            .build()
            .unwrap();
        let outer = Flow::builder("outer")
            .start(Arc::new(StubStep::new("a")))
            .next(inner)
            .next(Arc::new(StubStep::new("b")))
            .build()
            .unwrap();

        assert_eq!(outer.step_names(), vec!["a", "x", "y", "b"]);
        assert!(outer.step("y").is_some());
        assert!(outer.step("z").is_none());

        let mut executor = executor().await;
        let result = outer.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Completed);
        assert_eq!(step_names(&executor).await, vec!["a", "x", "y", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn split_with_terminating_branch_stops() {
        let slow = Arc::new(SleepStep::new("slow", Duration::from_millis(500)));
        let fast = Arc::new(TerminateOnlyStep::new("fast"));

        let flow = Flow::builder("job")
            .split(vec![
                Flow::builder("slow-flow").start(slow.clone()).build().unwrap(),
                Flow::builder("fast-flow").start(fast).build().unwrap(),
            ])
            .build()
            .unwrap();

        let mut executor = executor_with(Arc::new(TokioTaskExecutor::new())).await;
        let result = flow.start(&mut executor).await.unwrap();

        assert_eq!(result.status(), &FlowExecutionStatus::Stopped);
        assert_eq!(slow.executions(), 1);

        let job = executor.job_execution().await;
        let slow_execution = job.step_execution("slow").unwrap();
        assert_eq!(slow_execution.status(), BatchStatus::Completed);
        assert!(job.step_execution("fast").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn split_branches_run_concurrently() {
        let steps: Vec<_> = (0..4)
            .map(|i| Arc::new(SleepStep::new(format!("s{i}"), Duration::from_millis(200))))
            .collect();
        let branches = steps
            .iter()
            .map(|s| {
                Flow::builder(format!("{}-flow", s.name()))
                    .start(s.clone())
                    .build()
                    .unwrap()
            })
            .collect();

        let flow = Flow::builder("job").split(branches).build().unwrap();
        let mut executor = executor_with(Arc::new(TokioTaskExecutor::new())).await;

        let started = std::time::Instant::now();
        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Completed);
        assert!(started.elapsed() < Duration::from_millis(700));
        assert_eq!(executor.job_execution().await.step_executions().len(), 4);
    }

    #[tokio::test]
    async fn failed_branch_fails_the_split() {
        let flow = Flow::builder("job")
            .split(vec![
                Flow::builder("ok").start(Arc::new(StubStep::new("a"))).build().unwrap(),
                Flow::builder("bad")
                    .start(Arc::new(FailingStep::new("b")))
                    .build()
                    .unwrap(),
            ])
            .on("FAILED")
            .fail()
            .build()
            .unwrap();

        let mut executor = executor().await;
        let result = flow.start(&mut executor).await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn resume_starts_from_an_entry_point() {
        let definition = FlowDefinition::builder()
            .with_name("job")
            .with_start("a")
            .with_entry_points(vec!["b".to_owned()])
            .state(StepState::new(Arc::new(StubStep::new("a"))))
            .state(StepState::new(Arc::new(StubStep::new("b"))))
            .state(EndState::new("end", FlowExecutionStatus::Completed))
            .transition(StateTransition::new("a", "*", "end"))
            .transition(StateTransition::new("b", "*", "end"))
            .build()
            .unwrap();
        let flow = definition.compile().unwrap();

        let mut executor = executor().await;
        let result = flow.resume(&mut executor, "b").await.unwrap();
        assert_eq!(result.status(), &FlowExecutionStatus::Completed);
        assert_eq!(step_names(&executor).await, vec!["b"]);

        let missing = flow.resume(&mut executor, "nope").await;
        assert!(matches!(missing, Err(FlowError::UnknownStartState { .. })));
    }
}
