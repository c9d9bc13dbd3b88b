//! Partitioned step.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use batchflow_core::{
    BatchStatus, BoxError, CoreError, ExitStatus, JobRepository, Step, StepExecution,
};
use futures::FutureExt;
use jiff::Timestamp;

use super::{Partitioner, StepExecutionSplitter};
use crate::aggregate::StepExecutionAggregator;
use crate::engine::{EngineConfig, TaskExecutor, TokioTaskExecutor, run_step, submit};
use crate::error::{FlowError, FlowResult};

/// Tracing target for partitioned steps.
const TRACING_TARGET: &str = "batchflow_runtime::partition";

/// Step that runs a worker step once per partition, concurrently.
///
/// The manager execution ends with the aggregate of its partitions: the most
/// severe status, the combined exit status and the summed counters. It fails
/// if any partition did not succeed.
pub struct PartitionStep {
    name: String,
    worker: Arc<dyn Step>,
    splitter: StepExecutionSplitter,
    repository: Arc<dyn JobRepository>,
    task_executor: Arc<dyn TaskExecutor>,
    aggregator: StepExecutionAggregator,
    grid_size: usize,
    allow_start_if_complete: bool,
}

impl PartitionStep {
    /// Creates a partitioned step called `name`.
    ///
    /// The grid size defaults to the configured one and partitions run on a
    /// tokio task executor bounded by the configuration.
    pub fn new(
        name: impl Into<String>,
        worker: Arc<dyn Step>,
        partitioner: Arc<dyn Partitioner>,
        repository: Arc<dyn JobRepository>,
        config: &EngineConfig,
    ) -> Self {
        let name = name.into();
        Self {
            splitter: StepExecutionSplitter::new(name.clone(), partitioner),
            name,
            worker,
            repository,
            task_executor: Arc::new(TokioTaskExecutor::from_config(config)),
            aggregator: StepExecutionAggregator::new(),
            grid_size: config.default_grid_size,
            allow_start_if_complete: false,
        }
    }

    /// Sets the number of partitions requested from the partitioner.
    #[must_use]
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size.max(1);
        self
    }

    /// Sets the task executor the partitions run on.
    #[must_use]
    pub fn with_task_executor(mut self, task_executor: Arc<dyn TaskExecutor>) -> Self {
        self.task_executor = task_executor;
        self
    }

    /// Lets the step and its partitions run again after they completed.
    #[must_use]
    pub fn with_allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self.splitter = self.splitter.with_allow_start_if_complete(allow);
        self
    }

    /// Returns the worker step.
    #[inline]
    pub fn worker(&self) -> &Arc<dyn Step> {
        &self.worker
    }

    /// Returns the requested grid size.
    #[inline]
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    async fn run(&self, manager: &mut StepExecution) -> FlowResult<()> {
        let job_execution = self
            .repository
            .get_job_execution(manager.job_execution_id())
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!("job execution {}", manager.job_execution_id()))
            })?;

        let executions = self
            .splitter
            .split(manager, &job_execution, self.grid_size, &*self.repository)
            .await?;
        let total = executions.len();

        tracing::info!(
            target: TRACING_TARGET,
            step = %self.name,
            partitions = total,
            "Running partitions"
        );

        let handles: Vec<_> = executions
            .into_iter()
            .map(|mut execution| {
                let worker = self.worker.clone();
                let repository = self.repository.clone();
                submit(&*self.task_executor, async move {
                    run_partition(&*worker, &mut execution, &*repository).await;
                    execution
                })
            })
            .collect();

        let mut finished = Vec::with_capacity(total);
        let mut lost = 0;
        for handle in handles {
            match handle.await {
                Ok(execution) => finished.push(execution),
                Err(e) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        step = %self.name,
                        error = %e,
                        "Partition lost"
                    );
                    manager.add_failure(&e);
                    lost += 1;
                }
            }
        }

        self.aggregator.aggregate(manager, &finished);

        let failed = lost
            + finished
                .iter()
                .filter(|e| e.status().is_unsuccessful())
                .count();
        if failed > 0 {
            return Err(FlowError::PartitionFailed {
                step: self.name.clone(),
                failed,
                total,
            });
        }

        tracing::info!(
            target: TRACING_TARGET,
            step = %self.name,
            status = %manager.status(),
            "Partitions finished"
        );
        Ok(())
    }
}

/// Runs the worker for one partition; a panicking worker fails the partition.
async fn run_partition(
    worker: &dyn Step,
    execution: &mut StepExecution,
    repository: &dyn JobRepository,
) {
    let outcome = AssertUnwindSafe(run_step(worker, execution, repository))
        .catch_unwind()
        .await;

    let cause = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("worker step '{}' panicked", worker.name()),
    };

    tracing::warn!(
        target: TRACING_TARGET,
        partition = execution.step_name(),
        cause = %cause,
        "Partition failed"
    );

    execution.upgrade_status(BatchStatus::Failed);
    let exit_status = execution
        .exit_status()
        .and(&ExitStatus::FAILED.add_exit_description(&cause));
    execution.set_exit_status(exit_status);
    execution.add_failure(cause);
    execution.set_end_time(Timestamp::now());

    if let Err(e) = repository.update_step_execution(execution).await {
        tracing::warn!(
            target: TRACING_TARGET,
            partition = execution.step_name(),
            error = %e,
            "Failed to record partition failure"
        );
    }
}

#[async_trait]
impl Step for PartitionStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    async fn execute(&self, execution: &mut StepExecution) -> Result<(), BoxError> {
        self.run(execution).await.map_err(BoxError::from)
    }
}

impl fmt::Debug for PartitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionStep")
            .field("name", &self.name)
            .field("worker", &self.worker.name())
            .field("grid_size", &self.grid_size)
            .field("task_executor", &self.task_executor)
            .finish_non_exhaustive()
    }
}
