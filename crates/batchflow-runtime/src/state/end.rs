//! End state.

use batchflow_core::{BatchStatus, ExitStatus};

use crate::engine::FlowExecutor;
use crate::error::FlowResult;
use crate::status::FlowExecutionStatus;

/// Tracing target for end states.
const TRACING_TARGET: &str = "batchflow_runtime::end";

/// Terminal state returning a fixed status.
///
/// The exit code, which defaults to the status name, is merged into the job
/// execution's exit status. A `STOPPED` end state is restartable: when it is
/// reached again at the start of a restart it yields `COMPLETED`, so the
/// flow carries on past the point where it stopped. With `abandon` set, the
/// last step execution is marked `ABANDONED` on the way out so a restart
/// does not run it again. Whatever its status, the state ends `UNKNOWN` when
/// the last step execution is `UNKNOWN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndState {
    name: String,
    status: FlowExecutionStatus,
    exit_code: Option<String>,
    abandon: bool,
}

impl EndState {
    /// Creates an end state with the given status.
    pub fn new(name: impl Into<String>, status: FlowExecutionStatus) -> Self {
        Self {
            name: name.into(),
            status,
            exit_code: None,
            abandon: false,
        }
    }

    /// Sets a custom exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: impl Into<String>) -> Self {
        self.exit_code = Some(exit_code.into());
        self
    }

    /// Sets whether the last step execution is abandoned when stopping.
    #[must_use]
    pub fn with_abandon(mut self, abandon: bool) -> Self {
        self.abandon = abandon;
        self
    }

    /// Returns the state name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the status this state ends with.
    #[inline]
    pub fn status(&self) -> &FlowExecutionStatus {
        &self.status
    }

    /// Returns the exit code merged into the job execution.
    pub fn exit_code(&self) -> &str {
        self.exit_code.as_deref().unwrap_or(self.status.name())
    }

    /// Returns whether the last step execution is abandoned when stopping.
    #[inline]
    pub fn is_abandon(&self) -> bool {
        self.abandon
    }

    /// Returns whether a job stopped here can be restarted from this point.
    pub fn is_restartable(&self) -> bool {
        self.status.is_stop()
    }

    pub(crate) async fn handle(
        &self,
        executor: &mut FlowExecutor,
    ) -> FlowResult<FlowExecutionStatus> {
        if executor
            .step_execution()
            .is_some_and(|s| s.status() == BatchStatus::Unknown)
        {
            tracing::warn!(
                target: TRACING_TARGET,
                state = %self.name,
                "Last step is in an unknown state"
            );
            return Ok(FlowExecutionStatus::Unknown);
        }

        if self.status.is_stop() {
            if executor.is_restart().await {
                tracing::debug!(
                    target: TRACING_TARGET,
                    state = %self.name,
                    "Restart passes through stop state"
                );
                return Ok(FlowExecutionStatus::Completed);
            }
            if self.abandon {
                executor.abandon_step_execution().await?;
            }
        }

        executor
            .add_exit_status(&ExitStatus::new(self.exit_code().to_owned()))
            .await;

        tracing::debug!(
            target: TRACING_TARGET,
            state = %self.name,
            status = %self.status,
            exit_code = self.exit_code(),
            "End state reached"
        );
        Ok(self.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use batchflow_core::{InMemoryJobRepository, JobParameters, JobRepository};

    use super::*;
    use crate::engine::SyncTaskExecutor;

    async fn executor(restart: bool) -> FlowExecutor {
        let repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let job = repo
            .create_job_execution("job", JobParameters::new())
            .await
            .unwrap()
            .with_restart(restart);
        FlowExecutor::new(job, repo, Arc::new(SyncTaskExecutor))
    }

    #[tokio::test]
    async fn exit_code_reaches_the_job() {
        let mut executor = executor(false).await;
        let state = EndState::new("end", FlowExecutionStatus::Completed)
            .with_exit_code("COMPLETED_WITH_SKIPS");

        let status = state.handle(&mut executor).await.unwrap();
        assert_eq!(status, FlowExecutionStatus::Completed);

        let job = executor.job_execution().await;
        assert_eq!(job.exit_status().exit_code(), "COMPLETED_WITH_SKIPS");
    }

    #[tokio::test]
    async fn stop_state_passes_through_on_restart() {
        let state = EndState::new("stop", FlowExecutionStatus::Stopped);
        assert!(state.is_restartable());

        let mut first = executor(false).await;
        let status = state.handle(&mut first).await.unwrap();
        assert_eq!(status, FlowExecutionStatus::Stopped);

        let mut restart = executor(true).await;
        let status = state.handle(&mut restart).await.unwrap();
        assert_eq!(status, FlowExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn failed_state_is_not_restartable() {
        let state = EndState::new("fail", FlowExecutionStatus::Failed);
        assert!(!state.is_restartable());

        let mut executor = executor(true).await;
        let status = state.handle(&mut executor).await.unwrap();
        assert_eq!(status, FlowExecutionStatus::Failed);
    }
}
