//! Summaries of concurrently run step executions.

use batchflow_core::StepExecution;

/// Folds the executions of partitions into the execution that owns them.
///
/// The result status is upgraded to the most severe status of the inputs and
/// is never downgraded, so aggregating again after more partitions finished
/// is safe. Exit statuses are combined and counters summed. Failure causes
/// are carried over so the owning step can report why a partition failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepExecutionAggregator;

impl StepExecutionAggregator {
    /// Creates a new aggregator.
    pub fn new() -> Self {
        Self
    }

    /// Merges `executions` into `result`. Does nothing when there are none.
    pub fn aggregate(&self, result: &mut StepExecution, executions: &[StepExecution]) {
        if executions.is_empty() {
            return;
        }

        let mut status = result.status();
        let mut exit_status = result.exit_status().clone();
        let mut counters = *result.counters();

        for execution in executions {
            status = status.upgrade_to(execution.status());
            exit_status = exit_status.and(execution.exit_status());
            counters += *execution.counters();
            for failure in execution.failures() {
                result.add_failure(format!("{}: {failure}", execution.step_name()));
            }
        }

        result.set_status(status);
        result.set_exit_status(exit_status);
        *result.counters_mut() = counters;
    }
}

#[cfg(test)]
mod tests {
    use batchflow_core::{
        BatchStatus, ExitStatus, InMemoryJobRepository, JobParameters, JobRepository,
    };

    use super::*;

    async fn executions(repo: &InMemoryJobRepository, names: &[&str]) -> Vec<StepExecution> {
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut out = Vec::new();
        for name in names {
            out.push(repo.create_step_execution(&job, name).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn empty_input_leaves_the_result_alone() {
        let repo = InMemoryJobRepository::new();
        let mut result = executions(&repo, &["manager"]).await.remove(0);
        result.set_status(BatchStatus::Started);

        StepExecutionAggregator::new().aggregate(&mut result, &[]);
        assert_eq!(result.status(), BatchStatus::Started);
        assert_eq!(result.exit_status(), &ExitStatus::EXECUTING);
    }

    #[tokio::test]
    async fn worst_status_and_counter_sums_win() {
        let repo = InMemoryJobRepository::new();
        let mut all = executions(&repo, &["manager", "p0", "p1", "p2"]).await;
        let mut result = all.remove(0);

        for (execution, status) in all.iter_mut().zip([
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::Completed,
        ]) {
            execution.set_status(status);
            execution.counters_mut().read = 10;
            execution.counters_mut().write = 8;
        }
        all[0].set_exit_status(ExitStatus::COMPLETED);
        all[1].set_exit_status(ExitStatus::FAILED);
        all[1].add_failure("disk full");
        all[2].set_exit_status(ExitStatus::COMPLETED);

        StepExecutionAggregator::new().aggregate(&mut result, &all);

        assert_eq!(result.status(), BatchStatus::Failed);
        assert_eq!(result.exit_status().exit_code(), "FAILED");
        assert_eq!(result.counters().read, 30);
        assert_eq!(result.counters().write, 24);
        assert_eq!(result.failures(), ["p1: disk full"]);
    }

    #[tokio::test]
    async fn status_is_never_downgraded() {
        let repo = InMemoryJobRepository::new();
        let mut all = executions(&repo, &["manager", "p0"]).await;
        let mut result = all.remove(0);
        result.set_status(BatchStatus::Failed);
        all[0].set_status(BatchStatus::Completed);

        StepExecutionAggregator::new().aggregate(&mut result, &all);
        assert_eq!(result.status(), BatchStatus::Failed);

        result.set_status(BatchStatus::Started);
        StepExecutionAggregator::new().aggregate(&mut result, &all);
        assert_eq!(result.status(), BatchStatus::Completed);
    }
}
