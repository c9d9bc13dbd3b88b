//! Starting and running individual steps.

use batchflow_core::{
    BatchStatus, CoreError, ExitStatus, JobInstanceId, JobRepository, Step, StepExecution,
};
use jiff::Timestamp;

use crate::error::FlowResult;

/// Tracing target for step execution.
const TRACING_TARGET: &str = "batchflow_runtime::step";

/// Decides whether `step` runs again given its last recorded execution.
///
/// A step without history always starts. A step that last ended `UNKNOWN`
/// cannot be restarted automatically. Completed steps are skipped unless they
/// allow a start after completion, abandoned steps are always skipped, and
/// everything else is bounded by the step's start limit.
pub(crate) async fn should_start(
    repository: &dyn JobRepository,
    job_instance: JobInstanceId,
    last: Option<&StepExecution>,
    step: &dyn Step,
) -> FlowResult<bool> {
    let Some(last) = last else {
        return Ok(true);
    };

    match last.status() {
        BatchStatus::Unknown => Err(CoreError::JobRestart(format!(
            "step '{}' is in an unknown state and needs manual intervention",
            step.name()
        ))
        .into()),
        BatchStatus::Completed if !step.allow_start_if_complete() => Ok(false),
        BatchStatus::Abandoned => Ok(false),
        _ => {
            let count = repository
                .get_step_execution_count(job_instance, step.name())
                .await?;
            let limit = step.start_limit();
            if count < limit as usize {
                Ok(true)
            } else {
                Err(CoreError::StartLimitExceeded {
                    step: step.name().to_owned(),
                    limit,
                }
                .into())
            }
        }
    }
}

/// Runs `step` against `execution` and records the outcome.
///
/// Errors returned by the step are not propagated: they fail the execution
/// and are recorded as its failure cause. A step that asked to terminate
/// ends `STOPPED`. When the outcome cannot be recorded the execution ends
/// `UNKNOWN`, which blocks automatic restarts of the step.
///
/// # Errors
///
/// Fails only when the start of the execution cannot be recorded, in which
/// case the step did not run.
pub(crate) async fn run_step(
    step: &dyn Step,
    execution: &mut StepExecution,
    repository: &dyn JobRepository,
) -> FlowResult<()> {
    execution.set_start_time(Timestamp::now());
    execution.set_status(BatchStatus::Started);
    repository.update_step_execution(execution).await?;

    tracing::info!(
        target: TRACING_TARGET,
        step = step.name(),
        step_execution_id = %execution.id(),
        "Executing step"
    );

    let exit_status = match step.execute(execution).await {
        Ok(()) if execution.is_terminate_only() => {
            execution.upgrade_status(BatchStatus::Stopped);
            tracing::warn!(
                target: TRACING_TARGET,
                step = step.name(),
                "Step requested termination"
            );
            ExitStatus::COMPLETED
                .and(execution.exit_status())
                .and(&ExitStatus::STOPPED.add_exit_description("step requested termination"))
        }
        Ok(()) => {
            execution.upgrade_status(BatchStatus::Completed);
            ExitStatus::COMPLETED.and(execution.exit_status())
        }
        Err(e) => {
            execution.upgrade_status(BatchStatus::Failed);
            execution.add_failure(&e);
            tracing::warn!(
                target: TRACING_TARGET,
                step = step.name(),
                error = %e,
                "Step failed"
            );
            execution
                .exit_status()
                .and(&ExitStatus::FAILED.add_exit_description(&e.to_string()))
        }
    };

    execution.set_exit_status(exit_status);
    execution.set_end_time(Timestamp::now());

    if let Err(e) = repository.update_step_execution(execution).await {
        // The work is done but its record is not, so the step can neither
        // count as finished nor be run again blindly.
        tracing::error!(
            target: TRACING_TARGET,
            step = step.name(),
            error = %e,
            "Failed to record step outcome, step state is unknown"
        );
        execution.upgrade_status(BatchStatus::Unknown);
        let exit_status = execution
            .exit_status()
            .and(&ExitStatus::UNKNOWN.add_exit_description(&e.to_string()));
        execution.set_exit_status(exit_status);
        execution.add_failure(&e);
        return Ok(());
    }

    tracing::info!(
        target: TRACING_TARGET,
        step = step.name(),
        status = %execution.status(),
        exit_code = execution.exit_status().exit_code(),
        "Step finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use batchflow_core::{InMemoryJobRepository, JobParameters};
    use batchflow_test::{FailingStep, StubStep, TerminateOnlyStep};

    use super::*;

    #[tokio::test]
    async fn successful_step_completes() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut execution = repo.create_step_execution(&job, "a").await.unwrap();

        let step = StubStep::new("a");
        run_step(&step, &mut execution, &repo).await.unwrap();

        assert_eq!(execution.status(), BatchStatus::Completed);
        assert_eq!(execution.exit_status().exit_code(), "COMPLETED");
        assert!(execution.end_time().is_some());
        assert_eq!(step.executions(), 1);
    }

    #[tokio::test]
    async fn custom_exit_code_is_kept() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut execution = repo.create_step_execution(&job, "a").await.unwrap();

        let step = StubStep::new("a").with_exit_code("COMPLETED_WITH_SKIPS");
        run_step(&step, &mut execution, &repo).await.unwrap();
        assert_eq!(execution.exit_status().exit_code(), "COMPLETED_WITH_SKIPS");
        assert_eq!(execution.status(), BatchStatus::Completed);
    }

    #[tokio::test]
    async fn failing_step_records_cause() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut execution = repo.create_step_execution(&job, "b").await.unwrap();

        run_step(&FailingStep::new("b"), &mut execution, &repo)
            .await
            .unwrap();

        assert_eq!(execution.status(), BatchStatus::Failed);
        assert_eq!(execution.exit_status().exit_code(), "FAILED");
        assert_eq!(execution.failures().len(), 1);
    }

    #[tokio::test]
    async fn terminate_only_step_stops() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut execution = repo.create_step_execution(&job, "t").await.unwrap();

        run_step(&TerminateOnlyStep::new("t"), &mut execution, &repo)
            .await
            .unwrap();

        assert_eq!(execution.status(), BatchStatus::Stopped);
        assert_eq!(execution.exit_status().exit_code(), "STOPPED");
    }

    #[tokio::test]
    async fn restart_rules() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let instance = job.job_instance().id();
        let step = StubStep::new("a").with_start_limit(1);

        assert!(should_start(&repo, instance, None, &step).await.unwrap());

        let mut last = repo.create_step_execution(&job, "a").await.unwrap();
        last.set_status(BatchStatus::Completed);
        assert!(!should_start(&repo, instance, Some(&last), &step).await.unwrap());

        last.set_status(BatchStatus::Abandoned);
        assert!(!should_start(&repo, instance, Some(&last), &step).await.unwrap());

        last.set_status(BatchStatus::Failed);
        let limited = should_start(&repo, instance, Some(&last), &step).await;
        assert!(matches!(
            limited,
            Err(crate::FlowError::Core(CoreError::StartLimitExceeded { limit: 1, .. }))
        ));

        last.set_status(BatchStatus::Unknown);
        let unknown = should_start(&repo, instance, Some(&last), &StubStep::new("a")).await;
        assert!(matches!(
            unknown,
            Err(crate::FlowError::Core(CoreError::JobRestart(_)))
        ));
    }

    #[tokio::test]
    async fn completed_step_reruns_when_allowed() {
        let repo = InMemoryJobRepository::new();
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap();
        let mut last = repo.create_step_execution(&job, "a").await.unwrap();
        last.set_status(BatchStatus::Completed);

        let step = StubStep::new("a").with_allow_start_if_complete(true);
        let start = should_start(&repo, job.job_instance().id(), Some(&last), &step)
            .await
            .unwrap();
        assert!(start);
    }
}
