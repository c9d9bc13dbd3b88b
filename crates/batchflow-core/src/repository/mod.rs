//! Persistence contract for execution records.
//!
//! The flow engine only needs a narrow slice of a job repository: creating
//! and updating execution records and looking up the last execution of a
//! step for restart decisions. [`InMemoryJobRepository`] is a complete
//! implementation suitable for tests and embedded use.

mod memory;

use async_trait::async_trait;
pub use memory::InMemoryJobRepository;

use crate::error::CoreResult;
use crate::execution::{
    JobExecution, JobExecutionId, JobInstanceId, JobParameters, StepExecution,
};

/// Persistence contract for job and step execution records.
#[async_trait]
pub trait JobRepository: Send + Sync + std::fmt::Debug {
    /// Creates a job execution for the instance identified by `job_name`
    /// and `parameters`, creating the instance if needed.
    ///
    /// # Errors
    ///
    /// Fails when an execution of the instance is still running, when the
    /// instance already completed, or when an earlier execution was abandoned
    /// or ended in an unknown state.
    async fn create_job_execution(
        &self,
        job_name: &str,
        parameters: JobParameters,
    ) -> CoreResult<JobExecution>;

    /// Creates and stores a step execution belonging to `job_execution`.
    async fn create_step_execution(
        &self,
        job_execution: &JobExecution,
        step_name: &str,
    ) -> CoreResult<StepExecution>;

    /// Stores the current state of a step execution.
    async fn update_step_execution(&self, step_execution: &StepExecution) -> CoreResult<()>;

    /// Stores the current state of a job execution.
    async fn update_job_execution(&self, job_execution: &JobExecution) -> CoreResult<()>;

    /// Returns the most recent execution of `step_name` across all
    /// executions of the job instance.
    async fn get_last_step_execution(
        &self,
        job_instance: JobInstanceId,
        step_name: &str,
    ) -> CoreResult<Option<StepExecution>>;

    /// Returns how many times `step_name` was started for the job instance.
    async fn get_step_execution_count(
        &self,
        job_instance: JobInstanceId,
        step_name: &str,
    ) -> CoreResult<usize>;

    /// Returns the stored copy of a job execution.
    async fn get_job_execution(&self, id: JobExecutionId) -> CoreResult<Option<JobExecution>>;

    /// Returns the most recent execution of the instance identified by
    /// `job_name` and `parameters`, if the instance exists.
    async fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> CoreResult<Option<JobExecution>>;

    /// Returns all executions of the job instance, oldest first.
    async fn get_job_executions(&self, job_instance: JobInstanceId)
    -> CoreResult<Vec<JobExecution>>;
}
