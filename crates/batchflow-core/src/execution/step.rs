//! Step executions.

use std::fmt;

use derive_more::{Add, AddAssign};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ExecutionContext, JobExecution, JobExecutionId, JobInstanceId, StepExecutionId};
use crate::status::{BatchStatus, ExitStatus};

/// Item counters reported by a step execution.
///
/// Counters add up, which is how partitioned or split step executions are
/// summarized into one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Add, AddAssign)]
pub struct StepCounters {
    /// Items read.
    pub read: u64,
    /// Items written.
    pub write: u64,
    /// Items filtered out by processing.
    pub filter: u64,
    /// Committed transactions.
    pub commit: u64,
    /// Rolled back transactions.
    pub rollback: u64,
    /// Items skipped while reading.
    pub read_skip: u64,
    /// Items skipped while processing.
    pub process_skip: u64,
    /// Items skipped while writing.
    pub write_skip: u64,
}

impl StepCounters {
    /// Returns the total number of skipped items.
    pub fn skip(&self) -> u64 {
        self.read_skip + self.process_skip + self.write_skip
    }
}

/// One run of a step inside a job execution.
#[derive(Clone, Serialize, Deserialize)]
pub struct StepExecution {
    id: StepExecutionId,
    step_name: String,
    job_execution_id: JobExecutionId,
    job_instance_id: JobInstanceId,
    status: BatchStatus,
    exit_status: ExitStatus,
    execution_context: ExecutionContext,
    counters: StepCounters,
    terminate_only: bool,
    failures: Vec<String>,
    create_time: Timestamp,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    last_updated: Option<Timestamp>,
    #[serde(skip)]
    stop_token: CancellationToken,
}

impl StepExecution {
    /// Creates a step execution belonging to `job_execution`.
    ///
    /// The step shares the job's stop token, so a stop requested on the job
    /// is visible through [`StepExecution::is_stop_requested`].
    pub fn new(
        id: StepExecutionId,
        step_name: impl Into<String>,
        job_execution: &JobExecution,
    ) -> Self {
        Self {
            id,
            step_name: step_name.into(),
            job_execution_id: job_execution.id(),
            job_instance_id: job_execution.job_instance().id(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::EXECUTING,
            execution_context: ExecutionContext::new(),
            counters: StepCounters::default(),
            terminate_only: false,
            failures: Vec::new(),
            create_time: Timestamp::now(),
            start_time: None,
            end_time: None,
            last_updated: None,
            stop_token: job_execution.stop_token(),
        }
    }

    /// Returns the execution identifier.
    #[inline]
    pub fn id(&self) -> StepExecutionId {
        self.id
    }

    /// Returns the step name.
    #[inline]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Returns the owning job execution identifier.
    #[inline]
    pub fn job_execution_id(&self) -> JobExecutionId {
        self.job_execution_id
    }

    /// Returns the owning job instance identifier.
    #[inline]
    pub fn job_instance_id(&self) -> JobInstanceId {
        self.job_instance_id
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

    /// Replaces the execution context.
    pub fn set_execution_context(&mut self, execution_context: ExecutionContext) {
        self.execution_context = execution_context;
    }

    /// Returns the item counters.
    #[inline]
    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    /// Returns the item counters mutably.
    #[inline]
    pub fn counters_mut(&mut self) -> &mut StepCounters {
        &mut self.counters
    }

    /// Returns whether the step asked to terminate the job.
    #[inline]
    pub fn is_terminate_only(&self) -> bool {
        self.terminate_only
    }

    /// Signals that the job should stop once this step returns.
    pub fn set_terminate_only(&mut self) {
        self.terminate_only = true;
    }

    /// Returns whether a stop was requested on the owning job execution.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_token.is_cancelled()
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

impl fmt::Debug for StepExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepExecution")
            .field("id", &self.id)
            .field("step_name", &self.step_name)
            .field("status", &self.status)
            .field("exit_status", &self.exit_status)
            .field("counters", &self.counters)
            .field("terminate_only", &self.terminate_only)
            .finish()
    }
}
