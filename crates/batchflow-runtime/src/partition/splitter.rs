//! Splitting a manager step execution into partition executions.

use std::fmt;
use std::sync::Arc;

use batchflow_core::{BatchStatus, CoreError, JobExecution, JobRepository, StepExecution};

use super::Partitioner;
use crate::error::FlowResult;

/// Tracing target for partition splitting.
const TRACING_TARGET: &str = "batchflow_runtime::partition";

/// Key under which the grid size is kept in the manager's context.
const GRID_SIZE_KEY: &str = "partition.grid_size";

/// Creates the step executions of a partitioned step.
///
/// Partition executions are named `<step>:<partition>` so they can be found
/// again on restart. The grid size of the first run is kept in the manager's
/// execution context and reused on restart, whatever the step asks for then.
pub struct StepExecutionSplitter {
    step_name: String,
    partitioner: Arc<dyn Partitioner>,
    allow_start_if_complete: bool,
}

impl StepExecutionSplitter {
    /// Creates a splitter for the manager step `step_name`.
    pub fn new(step_name: impl Into<String>, partitioner: Arc<dyn Partitioner>) -> Self {
        Self {
            step_name: step_name.into(),
            partitioner,
            allow_start_if_complete: false,
        }
    }

    /// Sets whether completed partitions run again on restart.
    #[must_use]
    pub fn with_allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    /// Returns the manager step name.
    #[inline]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Creates and stores the partition executions that have to run.
    ///
    /// Partitions that completed in an earlier job execution are left out.
    /// A partition that did not complete starts from the execution context
    /// of its last attempt; a fresh one from the partitioner's context.
    ///
    /// # Errors
    ///
    /// Fails when the repository does, or when a partition cannot be
    /// restarted from its last status.
    pub async fn split(
        &self,
        manager: &mut StepExecution,
        job_execution: &JobExecution,
        grid_size: usize,
        repository: &dyn JobRepository,
    ) -> FlowResult<Vec<StepExecution>> {
        let grid_size = self.grid_size(manager, grid_size);
        if manager.execution_context().is_dirty() {
            repository.update_step_execution(manager).await?;
            manager.execution_context_mut().clear_dirty();
        }

        let partitions = self.partitioner.partition(grid_size);
        let job_instance = job_execution.job_instance().id();
        let mut executions = Vec::with_capacity(partitions.len());

        for (partition, context) in partitions {
            let name = format!("{}:{partition}", self.step_name);
            let last = repository.get_last_step_execution(job_instance, &name).await?;

            if !self.should_start(&name, last.as_ref(), job_execution)? {
                tracing::debug!(
                    target: TRACING_TARGET,
                    step = %self.step_name,
                    partition = %partition,
                    "Partition already complete, skipping"
                );
                continue;
            }

            let context = match last {
                Some(last) if last.status() != BatchStatus::Completed => {
                    last.execution_context().clone()
                }
                _ => context,
            };

            let mut execution = repository.create_step_execution(job_execution, &name).await?;
            execution.set_execution_context(context);
            repository.update_step_execution(&execution).await?;
            executions.push(execution);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            step = %self.step_name,
            grid_size,
            partitions = executions.len(),
            "Step execution split"
        );

        Ok(executions)
    }

    /// Returns the grid size of the first run, recording it if this is it.
    fn grid_size(&self, manager: &mut StepExecution, requested: usize) -> usize {
        let context = manager.execution_context_mut();
        match context
            .get_i64(GRID_SIZE_KEY)
            .and_then(|size| usize::try_from(size).ok())
        {
            Some(size) => size,
            None => {
                context.put(GRID_SIZE_KEY, requested as i64);
                requested
            }
        }
    }

    fn should_start(
        &self,
        name: &str,
        last: Option<&StepExecution>,
        job_execution: &JobExecution,
    ) -> FlowResult<bool> {
        let Some(last) = last else {
            return Ok(true);
        };

        match last.status() {
            BatchStatus::Unknown => Err(CoreError::JobRestart(format!(
                "partition '{name}' is in an unknown state and needs manual intervention"
            ))
            .into()),
            BatchStatus::Completed => Ok(self.allow_start_if_complete
                || last.job_execution_id() == job_execution.id()),
            BatchStatus::Stopped | BatchStatus::Failed => Ok(true),
            status => Err(CoreError::InvalidRestartStatus {
                step: name.to_owned(),
                status,
            }
            .into()),
        }
    }
}

impl fmt::Debug for StepExecutionSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepExecutionSplitter")
            .field("step_name", &self.step_name)
            .field("allow_start_if_complete", &self.allow_start_if_complete)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use batchflow_core::{ExecutionContext, InMemoryJobRepository, JobParameters};
    use jiff::Timestamp;

    use super::*;
    use crate::error::FlowError;
    use crate::partition::SimplePartitioner;

    fn splitter() -> StepExecutionSplitter {
        StepExecutionSplitter::new("load", Arc::new(SimplePartitioner::new()))
    }

    async fn finish(repo: &InMemoryJobRepository, job: &mut JobExecution, status: BatchStatus) {
        job.set_status(status);
        job.set_end_time(Timestamp::now());
        repo.update_job_execution(job).await.unwrap();
    }

    async fn set_status(
        repo: &InMemoryJobRepository,
        execution: &mut StepExecution,
        status: BatchStatus,
    ) {
        execution.set_status(status);
        repo.update_step_execution(execution).await.unwrap();
    }

    #[tokio::test]
    async fn partitions_are_named_after_the_step() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut manager = repo.create_step_execution(&job, "load").await.unwrap();

        let executions = splitter().split(&mut manager, &job, 3, &repo).await.unwrap();
        let names: Vec<_> = executions.iter().map(StepExecution::step_name).collect();
        assert_eq!(names, ["load:partition0", "load:partition1", "load:partition2"]);
        assert_eq!(repo.step_executions().await.len(), 4);
        assert_eq!(manager.execution_context().get_i64(GRID_SIZE_KEY), Some(3));
    }

    #[tokio::test]
    async fn partitions_carry_their_context() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut manager = repo.create_step_execution(&job, "load").await.unwrap();

        let partitioner = |_: usize| {
            let mut context = ExecutionContext::new();
            context.put("file", "a.csv");
            BTreeMap::from([("a".to_owned(), context)])
        };
        let splitter = StepExecutionSplitter::new("load", Arc::new(partitioner));

        let executions = splitter.split(&mut manager, &job, 4, &repo).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].execution_context().get_str("file"), Some("a.csv"));
    }

    #[tokio::test]
    async fn restart_keeps_grid_size_and_skips_completed_partitions() {
        let repo = InMemoryJobRepository::new();
        let mut job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut manager = repo.create_step_execution(&job, "load").await.unwrap();

        let mut first = splitter().split(&mut manager, &job, 2, &repo).await.unwrap();
        set_status(&repo, &mut first[0], BatchStatus::Completed).await;
        first[1].execution_context_mut().put("offset", 42_i64);
        set_status(&repo, &mut first[1], BatchStatus::Failed).await;
        finish(&repo, &mut job, BatchStatus::Failed).await;

        let restart = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut manager = repo.create_step_execution(&restart, "load").await.unwrap();
        manager.execution_context_mut().put(GRID_SIZE_KEY, 2_i64);

        let second = splitter().split(&mut manager, &restart, 8, &repo).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].step_name(), "load:partition1");
        assert_eq!(second[0].execution_context().get_i64("offset"), Some(42));
    }

    #[tokio::test]
    async fn unknown_partition_is_not_restarted() {
        let repo = InMemoryJobRepository::new();
        let mut job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut manager = repo.create_step_execution(&job, "load").await.unwrap();

        let mut first = splitter().split(&mut manager, &job, 1, &repo).await.unwrap();
        set_status(&repo, &mut first[0], BatchStatus::Unknown).await;
        finish(&repo, &mut job, BatchStatus::Failed).await;

        let restart = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut manager = repo.create_step_execution(&restart, "load").await.unwrap();
        let result = splitter().split(&mut manager, &restart, 1, &repo).await;
        assert!(matches!(result, Err(FlowError::Core(CoreError::JobRestart(_)))));
    }
}
