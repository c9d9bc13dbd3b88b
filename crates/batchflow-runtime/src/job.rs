//! Job facade running a flow against job executions.

use std::sync::Arc;

use batchflow_core::{
    BatchStatus, CoreError, ExitStatus, JobExecution, JobParameters, JobRepository, Step,
    StepExecution, StepExecutionId,
};
use jiff::Timestamp;

use crate::engine::{EngineConfig, FlowExecutor, TaskExecutor, TokioTaskExecutor};
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;
use crate::status::FlowExecution;

/// Tracing target for job execution.
const TRACING_TARGET: &str = "batchflow_runtime::job";

/// A job whose steps are laid out by a [`Flow`].
///
/// The job owns the lifecycle of a job execution: it marks it started, runs
/// the flow, and maps the flow's terminal status onto the execution's batch
/// and exit status. Errors escaping the flow do not escape the job: they fail
/// the execution and are recorded as its failure causes.
#[derive(Debug, Clone)]
pub struct FlowJob {
    flow: Arc<Flow>,
    repository: Arc<dyn JobRepository>,
    task_executor: Arc<dyn TaskExecutor>,
    restartable: bool,
}

impl FlowJob {
    /// Creates a restartable job named after `flow`.
    ///
    /// Splits run on a tokio task executor bounded by the configuration.
    pub fn new(flow: Flow, repository: Arc<dyn JobRepository>, config: &EngineConfig) -> Self {
        Self {
            flow: Arc::new(flow),
            repository,
            task_executor: Arc::new(TokioTaskExecutor::from_config(config)),
            restartable: true,
        }
    }

    /// Sets whether an instance of the job may run more than once.
    #[must_use]
    pub fn with_restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }

    /// Sets the task executor used by splits without their own.
    #[must_use]
    pub fn with_task_executor(mut self, task_executor: Arc<dyn TaskExecutor>) -> Self {
        self.task_executor = task_executor;
        self
    }

    /// Returns the job name.
    #[inline]
    pub fn name(&self) -> &str {
        self.flow.name()
    }

    /// Returns the flow.
    #[inline]
    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    /// Returns whether an instance of the job may run more than once.
    #[inline]
    pub fn is_restartable(&self) -> bool {
        self.restartable
    }

    /// Returns the names of every step of the job.
    pub fn step_names(&self) -> Vec<String> {
        self.flow.step_names()
    }

    /// Returns the step with the given name.
    pub fn step(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.flow.step(name)
    }

    /// Creates an execution for the instance identified by `parameters` and
    /// runs it.
    ///
    /// # Errors
    ///
    /// Fails when the repository refuses a new execution, or when the job is
    /// not restartable and the instance already ran.
    pub async fn launch(&self, parameters: JobParameters) -> FlowResult<JobExecution> {
        if !self.restartable
            && let Some(last) = self
                .repository
                .get_last_job_execution(self.name(), &parameters)
                .await?
        {
            return Err(CoreError::JobRestart(format!(
                "job '{}' is not restartable and instance already ran as execution {}",
                self.name(),
                last.id()
            ))
            .into());
        }

        let job_execution = self
            .repository
            .create_job_execution(self.name(), parameters)
            .await?;
        self.execute(job_execution).await
    }

    /// Runs the flow against `job_execution` and returns its final state.
    ///
    /// # Errors
    ///
    /// Only repository failures while recording the start or the end of the
    /// execution are returned; everything else is reflected in the returned
    /// execution's status.
    pub async fn execute(&self, mut job_execution: JobExecution) -> FlowResult<JobExecution> {
        if job_execution.is_stopping() {
            tracing::info!(
                target: TRACING_TARGET,
                job = self.name(),
                job_execution_id = %job_execution.id(),
                "Job stopped before it started"
            );
            job_execution.set_status(BatchStatus::Stopped);
            job_execution.set_exit_status(
                ExitStatus::STOPPED.add_exit_description("job stopped before it started"),
            );
            job_execution.set_end_time(Timestamp::now());
            self.repository.update_job_execution(&job_execution).await?;
            return Ok(job_execution);
        }

        job_execution.set_start_time(Timestamp::now());
        job_execution.set_status(BatchStatus::Started);
        job_execution.set_exit_status(ExitStatus::EXECUTING);
        self.repository.update_job_execution(&job_execution).await?;

        tracing::info!(
            target: TRACING_TARGET,
            job = self.name(),
            job_execution_id = %job_execution.id(),
            restart = job_execution.is_restart(),
            "Job started"
        );

        let mut executor = FlowExecutor::new(
            job_execution,
            self.repository.clone(),
            self.task_executor.clone(),
        );
        let result = self.flow.start(&mut executor).await;
        let last_step = executor.step_execution().map(StepExecution::id);
        let mut job_execution = executor.job_execution().await;

        match result {
            Ok(execution) => {
                self.complete(&mut job_execution, &execution, last_step)
                    .await?;
            }
            Err(e) => self.fail(&mut job_execution, &e),
        }

        if job_execution.status() <= BatchStatus::Stopped
            && job_execution.step_executions().is_empty()
        {
            let exit_status = job_execution.exit_status().and(
                &ExitStatus::NOOP
                    .add_exit_description("all steps already completed or no steps configured"),
            );
            job_execution.set_exit_status(exit_status);
        }

        job_execution.set_end_time(Timestamp::now());
        self.repository.update_job_execution(&job_execution).await?;

        tracing::info!(
            target: TRACING_TARGET,
            job = self.name(),
            job_execution_id = %job_execution.id(),
            status = %job_execution.status(),
            exit_code = job_execution.exit_status().exit_code(),
            "Job finished"
        );

        Ok(job_execution)
    }

    /// Maps the terminal status of the flow onto the job execution.
    async fn complete(
        &self,
        job_execution: &mut JobExecution,
        execution: &FlowExecution,
        last_step: Option<StepExecutionId>,
    ) -> FlowResult<()> {
        let status = execution.status();

        if status.is_unknown() {
            tracing::warn!(
                target: TRACING_TARGET,
                job = self.name(),
                state = execution.name(),
                "Flow ended in an unknown state"
            );
            job_execution.add_failure(format!(
                "flow '{}' ended in an unknown state at '{}'",
                self.flow.name(),
                execution.name()
            ));

            // The step may have done part of its work, so it must not be
            // advanced again without intervention.
            if let Some(id) = last_step
                && let Some(step_execution) = job_execution.step_execution_mut(id)
            {
                step_execution.upgrade_status(BatchStatus::Unknown);
                step_execution.set_terminate_only();
                self.repository.update_step_execution(step_execution).await?;
            }
        }

        job_execution.set_status(status.batch_status());
        let exit_status = job_execution
            .exit_status()
            .and(&ExitStatus::new(status.name().to_owned()));
        job_execution.set_exit_status(exit_status);
        Ok(())
    }

    fn fail(&self, job_execution: &mut JobExecution, error: &FlowError) {
        tracing::warn!(
            target: TRACING_TARGET,
            job = self.name(),
            error = %error,
            "Job failed"
        );
        job_execution.add_failure(error);
        job_execution.set_status(BatchStatus::Failed);
        let exit_status = job_execution
            .exit_status()
            .and(&ExitStatus::FAILED.add_exit_description(&error.to_string()));
        job_execution.set_exit_status(exit_status);
    }
}
