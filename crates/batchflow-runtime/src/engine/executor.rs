//! Per-execution flow context.

use std::fmt;
use std::sync::Arc;

use batchflow_core::{BatchStatus, ExitStatus, JobExecution, JobRepository, Step, StepExecution};
use tokio::sync::Mutex;

use super::handler::{run_step, should_start};
use super::task::TaskExecutor;
use crate::error::FlowResult;
use crate::status::FlowExecution;

/// Tracing target for executor operations.
const TRACING_TARGET: &str = "batchflow_runtime::executor";

/// Mutable context of one job execution, handed to every state of a flow.
///
/// The job execution is shared behind a lock so that the branches of a split
/// can record their step executions concurrently. Each branch works on its
/// own [`FlowExecutor::fork`], which tracks the branch's last step execution
/// and result separately.
pub struct FlowExecutor {
    job_execution: Arc<Mutex<JobExecution>>,
    repository: Arc<dyn JobRepository>,
    task_executor: Arc<dyn TaskExecutor>,
    step_execution: Option<StepExecution>,
    result: Option<FlowExecution>,
}

impl FlowExecutor {
    /// Creates an executor for `job_execution`.
    pub fn new(
        job_execution: JobExecution,
        repository: Arc<dyn JobRepository>,
        task_executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            job_execution: Arc::new(Mutex::new(job_execution)),
            repository,
            task_executor,
            step_execution: None,
            result: None,
        }
    }

    /// Creates an executor for a concurrent branch.
    ///
    /// The fork shares the job execution, repository and task executor, and
    /// starts from this executor's last step execution.
    pub fn fork(&self) -> Self {
        Self {
            job_execution: self.job_execution.clone(),
            repository: self.repository.clone(),
            task_executor: self.task_executor.clone(),
            step_execution: self.step_execution.clone(),
            result: None,
        }
    }

    /// Returns the repository.
    #[inline]
    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    /// Returns the task executor used for splits.
    #[inline]
    pub fn task_executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.task_executor
    }

    /// Returns a copy of the current job execution.
    pub async fn job_execution(&self) -> JobExecution {
        self.job_execution.lock().await.clone()
    }

    /// Applies `f` to the shared job execution.
    pub async fn update_job_execution<R>(&self, f: impl FnOnce(&mut JobExecution) -> R) -> R {
        let mut job_execution = self.job_execution.lock().await;
        f(&mut job_execution)
    }

    /// Returns the last step execution handled by this executor.
    #[inline]
    pub fn step_execution(&self) -> Option<&StepExecution> {
        self.step_execution.as_ref()
    }

    /// Returns the result recorded by [`FlowExecutor::close`].
    #[inline]
    pub fn result(&self) -> Option<&FlowExecution> {
        self.result.as_ref()
    }

    /// Returns whether a stop was requested on the job execution.
    pub async fn is_stopping(&self) -> bool {
        self.job_execution.lock().await.is_stopping()
    }

    /// Returns whether the flow is at the start of a restart.
    ///
    /// That is the case for a restarted job execution that has not run any
    /// step yet, or when the last step handled was abandoned.
    pub async fn is_restart(&self) -> bool {
        if self
            .step_execution
            .as_ref()
            .is_some_and(|s| s.status() == BatchStatus::Abandoned)
        {
            return true;
        }

        let job_execution = self.job_execution.lock().await;
        job_execution.is_restart() && job_execution.step_executions().is_empty()
    }

    /// Runs `step`, or skips it when it already completed in an earlier
    /// execution of the same job instance.
    ///
    /// Returns the exit status of the step execution that now represents the
    /// step, which is the previous one when the step was skipped.
    pub async fn execute_step(&mut self, step: &dyn Step) -> FlowResult<ExitStatus> {
        let job_execution = self.job_execution().await;
        let job_instance = job_execution.job_instance().id();

        let mut last = self
            .repository
            .get_last_step_execution(job_instance, step.name())
            .await?;

        if last
            .as_ref()
            .is_some_and(|s| s.job_execution_id() == job_execution.id())
        {
            tracing::debug!(
                target: TRACING_TARGET,
                step = step.name(),
                "Step already ran in this job execution, running it again"
            );
            last = None;
        }

        if !should_start(&*self.repository, job_instance, last.as_ref(), step).await? {
            if let Some(previous) = last {
                tracing::info!(
                    target: TRACING_TARGET,
                    step = step.name(),
                    status = %previous.status(),
                    "Step already complete or not restartable, skipping"
                );
                let exit_status = previous.exit_status().clone();
                self.step_execution = Some(previous);
                return Ok(exit_status);
            }
        }

        let mut execution = self
            .repository
            .create_step_execution(&job_execution, step.name())
            .await?;

        if let Some(previous) = last.as_ref().filter(|s| s.status() != BatchStatus::Completed) {
            execution.set_execution_context(previous.execution_context().clone());
        }

        self.update_job_execution(|job| job.add_step_execution(execution.clone()))
            .await;

        run_step(step, &mut execution, &*self.repository).await?;

        {
            let mut job = self.job_execution.lock().await;
            job.update_step_execution(&execution);
            if matches!(
                execution.status(),
                BatchStatus::Stopping | BatchStatus::Stopped
            ) {
                job.set_status(BatchStatus::Stopping);
            }
            self.repository.update_job_execution(&job).await?;
        }

        let exit_status = execution.exit_status().clone();
        self.step_execution = Some(execution);
        Ok(exit_status)
    }

    /// Marks the last step execution `ABANDONED` if it ended unsuccessfully
    /// or stopped, so a restart does not run it again.
    pub async fn abandon_step_execution(&mut self) -> FlowResult<()> {
        let Some(execution) = self.step_execution.as_mut() else {
            return Ok(());
        };
        if execution.status() <= BatchStatus::Stopping {
            return Ok(());
        }

        execution.upgrade_status(BatchStatus::Abandoned);
        self.repository.update_step_execution(execution).await?;

        let execution = execution.clone();
        self.update_job_execution(|job| job.update_step_execution(&execution))
            .await;

        tracing::debug!(
            target: TRACING_TARGET,
            step = execution.step_name(),
            "Abandoned step execution"
        );
        Ok(())
    }

    /// Merges `exit_status` into the job execution's exit status.
    pub async fn add_exit_status(&self, exit_status: &ExitStatus) {
        self.update_job_execution(|job| {
            let merged = job.exit_status().and(exit_status);
            job.set_exit_status(merged);
        })
        .await;
    }

    /// Records a failure cause on the job execution.
    pub async fn add_failure(&self, cause: impl fmt::Display) {
        let cause = cause.to_string();
        self.update_job_execution(|job| job.add_failure(cause)).await;
    }

    /// Records the final result of the flow this executor ran.
    pub fn close(&mut self, result: FlowExecution) {
        tracing::debug!(
            target: TRACING_TARGET,
            state = result.name(),
            status = %result.status(),
            "Flow execution closed"
        );
        self.result = Some(result);
    }
}

impl fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("repository", &self.repository)
            .field("task_executor", &self.task_executor)
            .field("step_execution", &self.step_execution)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
