//! Job instances and job executions.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::{Deref, From};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ExecutionContext, JobExecutionId, JobInstanceId, StepExecution, StepExecutionId};
use crate::status::{BatchStatus, ExitStatus};

/// Identifying parameters of a job instance.
///
/// Two launches of the same job with equal parameters belong to the same
/// job instance, which is what makes restarts possible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Deref, From)]
#[serde(transparent)]
pub struct JobParameters(BTreeMap<String, String>);

impl JobParameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// A logical run of a job: the job name plus its identifying parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobInstance {
    id: JobInstanceId,
    job_name: String,
    parameters: JobParameters,
}

impl JobInstance {
    /// Creates a job instance.
    pub fn new(id: JobInstanceId, job_name: impl Into<String>, parameters: JobParameters) -> Self {
        Self {
            id,
            job_name: job_name.into(),
            parameters,
        }
    }

    /// Returns the instance identifier.
    #[inline]
    pub fn id(&self) -> JobInstanceId {
        self.id
    }

    /// Returns the job name.
    #[inline]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Returns the identifying parameters.
    #[inline]
    pub fn parameters(&self) -> &JobParameters {
        &self.parameters
    }
}

/// One attempt at running a job instance.
///
/// Owns the step executions created during the attempt, in insertion order.
/// A stop can be requested at any time through [`JobExecution::stop`]; the
/// request is cooperative and is observed by the flow engine between states
/// and by steps that check [`StepExecution::is_stop_requested`].
#[derive(Clone, Serialize, Deserialize)]
pub struct JobExecution {
    id: JobExecutionId,
    job_instance: JobInstance,
    status: BatchStatus,
    exit_status: ExitStatus,
    step_executions: Vec<StepExecution>,
    execution_context: ExecutionContext,
    failures: Vec<String>,
    restart: bool,
    create_time: Timestamp,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    last_updated: Option<Timestamp>,
    #[serde(skip)]
    stop_token: CancellationToken,
}

impl JobExecution {
    /// Creates a fresh job execution for `job_instance`.
    pub fn new(id: JobExecutionId, job_instance: JobInstance) -> Self {
        Self {
            id,
            job_instance,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::UNKNOWN,
            step_executions: Vec::new(),
            execution_context: ExecutionContext::new(),
            failures: Vec::new(),
            restart: false,
            create_time: Timestamp::now(),
            start_time: None,
            end_time: None,
            last_updated: None,
            stop_token: CancellationToken::new(),
        }
    }

    /// Marks this execution as a restart of a previously unsuccessful one.
    #[must_use]
    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Sets the initial execution context.
    #[must_use]
    pub fn with_execution_context(mut self, execution_context: ExecutionContext) -> Self {
        self.execution_context = execution_context;
        self
    }

    /// Returns the execution identifier.
    #[inline]
    pub fn id(&self) -> JobExecutionId {
        self.id
    }

    /// Returns the job instance this execution belongs to.
    #[inline]
    pub fn job_instance(&self) -> &JobInstance {
        &self.job_instance
    }

    /// Returns the job name.
    #[inline]
    pub fn job_name(&self) -> &str {
        self.job_instance.job_name()
    }

    /// Returns the lifecycle status.
    #[inline]
    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Overwrites the lifecycle status.
    pub fn set_status(&mut self, status: BatchStatus) {
        self.status = status;
    }

    /// Upgrades the lifecycle status without downgrading a failure.
    pub fn upgrade_status(&mut self, status: BatchStatus) {
        self.status = self.status.upgrade_to(status);
    }

    /// Returns the reporting status.
    #[inline]
    pub fn exit_status(&self) -> &ExitStatus {
        &self.exit_status
    }

    /// Overwrites the reporting status.
    pub fn set_exit_status(&mut self, exit_status: ExitStatus) {
        self.exit_status = exit_status;
    }

    /// Returns whether this execution restarts an earlier one.
    #[inline]
    pub fn is_restart(&self) -> bool {
        self.restart
    }

    /// Returns whether the execution is still running.
    pub fn is_running(&self) -> bool {
        self.status.is_running() && self.end_time.is_none()
    }

    /// Returns whether a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.status == BatchStatus::Stopping || self.stop_token.is_cancelled()
    }

    /// Requests a cooperative stop of this execution.
    ///
    /// Running executions move to `Stopping`; the flow engine reports
    /// `Stopped` at its next check point.
    pub fn stop(&mut self) {
        self.stop_token.cancel();
        if self.status.is_running() {
            self.status = BatchStatus::Stopping;
        }
    }

    /// Returns a handle that can request or observe a stop from elsewhere.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    /// Returns the step executions in insertion order.
    #[inline]
    pub fn step_executions(&self) -> &[StepExecution] {
        &self.step_executions
    }

    /// Returns the names of the step executions in insertion order.
    pub fn step_names(&self) -> Vec<&str> {
        self.step_executions.iter().map(StepExecution::step_name).collect()
    }

    /// Returns the most recent step execution with the given name.
    pub fn step_execution(&self, step_name: &str) -> Option<&StepExecution> {
        self.step_executions
            .iter()
            .rev()
            .find(|s| s.step_name() == step_name)
    }

    /// Appends a step execution.
    pub fn add_step_execution(&mut self, step_execution: StepExecution) {
        self.step_executions.push(step_execution);
    }

    /// Replaces the step execution with the same identifier.
    ///
    /// Returns `false` when no step execution with that identifier exists.
    pub fn update_step_execution(&mut self, step_execution: &StepExecution) -> bool {
        match self.step_executions.iter_mut().find(|s| s.id() == step_execution.id()) {
            Some(existing) => {
                *existing = step_execution.clone();
                true
            }
            None => false,
        }
    }

    /// Returns a mutable handle on the step execution with the given identifier.
    pub fn step_execution_mut(&mut self, id: StepExecutionId) -> Option<&mut StepExecution> {
        self.step_executions.iter_mut().find(|s| s.id() == id)
    }

    /// Returns the execution context.
    #[inline]
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    /// Returns the execution context mutably.
    #[inline]
    pub fn execution_context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.execution_context
    }

    /// Returns the recorded failure causes.
    #[inline]
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Records a failure cause.
    pub fn add_failure(&mut self, cause: impl fmt::Display) {
        self.failures.push(cause.to_string());
    }

    /// Returns failure causes of this execution and all of its steps.
    pub fn all_failures(&self) -> Vec<&str> {
        self.failures
            .iter()
            .chain(self.step_executions.iter().flat_map(|s| s.failures().iter()))
            .map(String::as_str)
            .collect()
    }

    /// Returns the creation time.
    #[inline]
    pub fn create_time(&self) -> Timestamp {
        self.create_time
    }

    /// Returns the start time, if started.
    #[inline]
    pub fn start_time(&self) -> Option<Timestamp> {
        self.start_time
    }

    /// Records the start time.
    pub fn set_start_time(&mut self, time: Timestamp) {
        self.start_time = Some(time);
    }

    /// Returns the end time, if finished.
    #[inline]
    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    /// Records the end time.
    pub fn set_end_time(&mut self, time: Timestamp) {
        self.end_time = Some(time);
    }

    /// Returns the time of the last repository update.
    #[inline]
    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }

    /// Records the time of a repository update.
    pub fn set_last_updated(&mut self, time: Timestamp) {
        self.last_updated = Some(time);
    }
}

impl fmt::Debug for JobExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobExecution")
            .field("id", &self.id)
            .field("job_name", &self.job_name())
            .field("status", &self.status)
            .field("exit_status", &self.exit_status)
            .field("step_executions", &self.step_names())
            .field("restart", &self.restart)
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> JobExecution {
        let instance = JobInstance::new(JobInstanceId::new(), "job", JobParameters::new());
        JobExecution::new(JobExecutionId::new(), instance)
    }

    #[test]
    fn stop_moves_running_execution_to_stopping() {
        let mut job = execution();
        job.set_status(BatchStatus::Started);
        assert!(!job.is_stopping());

        job.stop();
        assert!(job.is_stopping());
        assert_eq!(job.status(), BatchStatus::Stopping);
    }

    #[test]
    fn stop_token_is_shared_between_clones() {
        let job = execution();
        let copy = job.clone();
        job.stop_token().cancel();
        assert!(copy.is_stopping());
    }

    #[test]
    fn step_executions_keep_insertion_order() {
        let mut job = execution();
        for name in ["a", "b", "a"] {
            let step = StepExecution::new(StepExecutionId::new(), name, &job);
            job.add_step_execution(step);
        }
        assert_eq!(job.step_names(), vec!["a", "b", "a"]);

        let last_a = job.step_execution("a").map(StepExecution::id);
        assert_eq!(last_a, job.step_executions().last().map(StepExecution::id));
    }

    #[test]
    fn update_replaces_by_id() {
        let mut job = execution();
        let mut step = StepExecution::new(StepExecutionId::new(), "a", &job);
        job.add_step_execution(step.clone());

        step.set_status(BatchStatus::Completed);
        assert!(job.update_step_execution(&step));
        assert_eq!(job.step_executions()[0].status(), BatchStatus::Completed);

        let stranger = StepExecution::new(StepExecutionId::new(), "b", &job);
        assert!(!job.update_step_execution(&stranger));
    }

    #[test]
    fn parameters_identify_instances() {
        let a = JobParameters::new().with("date", "2024-01-01");
        let b = JobParameters::new().with("date", "2024-01-01");
        assert_eq!(a, b);
        assert_eq!(a.get("date").map(String::as_str), Some("2024-01-01"));
    }
}
