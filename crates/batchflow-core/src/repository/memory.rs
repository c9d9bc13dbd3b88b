//! In-memory job repository.

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::RwLock;

use super::JobRepository;
use crate::error::{CoreError, CoreResult};
use crate::execution::{
    JobExecution, JobExecutionId, JobInstance, JobInstanceId, JobParameters, StepExecution,
    StepExecutionId,
};
use crate::status::BatchStatus;

/// Tracing target for repository operations.
const TRACING_TARGET: &str = "batchflow_core::repository";

/// Job repository that keeps every record in memory.
///
/// Records are kept in creation order, which is also the order used to
/// answer "last execution" queries.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    inner: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    instances: Vec<JobInstance>,
    job_executions: Vec<JobExecution>,
    step_executions: Vec<StepExecution>,
}

impl InMemoryJobRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored step execution, in creation order.
    pub async fn step_executions(&self) -> Vec<StepExecution> {
        self.inner.read().await.step_executions.clone()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_job_execution(
        &self,
        job_name: &str,
        parameters: JobParameters,
    ) -> CoreResult<JobExecution> {
        let mut inner = self.inner.write().await;

        let existing = inner
            .instances
            .iter()
            .find(|i| i.job_name() == job_name && i.parameters() == &parameters)
            .cloned();

        let execution = match existing {
            Some(instance) => {
                let previous: Vec<&JobExecution> = inner
                    .job_executions
                    .iter()
                    .filter(|e| e.job_instance().id() == instance.id())
                    .collect();

                for execution in &previous {
                    if execution.is_running() {
                        return Err(CoreError::JobExecutionAlreadyRunning {
                            job_name: job_name.to_owned(),
                        });
                    }
                    match execution.status() {
                        BatchStatus::Completed => {
                            return Err(CoreError::JobInstanceAlreadyComplete {
                                job_name: job_name.to_owned(),
                            });
                        }
                        BatchStatus::Abandoned => {
                            return Err(CoreError::JobRestart(format!(
                                "job '{job_name}' was abandoned"
                            )));
                        }
                        BatchStatus::Unknown => {
                            return Err(CoreError::JobRestart(format!(
                                "job '{job_name}' ended in an unknown state \
                                 and needs manual intervention"
                            )));
                        }
                        _ => {}
                    }
                }

                let context = previous
                    .last()
                    .map(|e| e.execution_context().clone())
                    .unwrap_or_default();

                tracing::debug!(
                    target: TRACING_TARGET,
                    job = job_name,
                    instance_id = %instance.id(),
                    previous_executions = previous.len(),
                    "Restarting job instance"
                );

                JobExecution::new(JobExecutionId::new(), instance)
                    .with_restart(!previous.is_empty())
                    .with_execution_context(context)
            }
            None => {
                let instance = JobInstance::new(JobInstanceId::new(), job_name, parameters);
                inner.instances.push(instance.clone());
                JobExecution::new(JobExecutionId::new(), instance)
            }
        };

        inner.job_executions.push(execution.clone());
        Ok(execution)
    }

    async fn create_step_execution(
        &self,
        job_execution: &JobExecution,
        step_name: &str,
    ) -> CoreResult<StepExecution> {
        let step_execution = StepExecution::new(StepExecutionId::new(), step_name, job_execution);
        self.inner
            .write()
            .await
            .step_executions
            .push(step_execution.clone());
        Ok(step_execution)
    }

    async fn update_step_execution(&self, step_execution: &StepExecution) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .step_executions
            .iter_mut()
            .find(|s| s.id() == step_execution.id())
            .ok_or_else(|| {
                CoreError::NotFound(format!("step execution {}", step_execution.id()))
            })?;

        *stored = step_execution.clone();
        stored.set_last_updated(Timestamp::now());
        Ok(())
    }

    async fn update_job_execution(&self, job_execution: &JobExecution) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .job_executions
            .iter_mut()
            .find(|e| e.id() == job_execution.id())
            .ok_or_else(|| CoreError::NotFound(format!("job execution {}", job_execution.id())))?;

        *stored = job_execution.clone();
        stored.set_last_updated(Timestamp::now());
        Ok(())
    }

    async fn get_last_step_execution(
        &self,
        job_instance: JobInstanceId,
        step_name: &str,
    ) -> CoreResult<Option<StepExecution>> {
        let inner = self.inner.read().await;
        Ok(inner
            .step_executions
            .iter()
            .rev()
            .find(|s| s.job_instance_id() == job_instance && s.step_name() == step_name)
            .cloned())
    }

    async fn get_step_execution_count(
        &self,
        job_instance: JobInstanceId,
        step_name: &str,
    ) -> CoreResult<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .step_executions
            .iter()
            .filter(|s| s.job_instance_id() == job_instance && s.step_name() == step_name)
            .count())
    }

    async fn get_job_execution(&self, id: JobExecutionId) -> CoreResult<Option<JobExecution>> {
        let inner = self.inner.read().await;
        Ok(inner.job_executions.iter().find(|e| e.id() == id).cloned())
    }

    async fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> CoreResult<Option<JobExecution>> {
        let inner = self.inner.read().await;
        let Some(instance) = inner
            .instances
            .iter()
            .find(|i| i.job_name() == job_name && i.parameters() == parameters)
        else {
            return Ok(None);
        };

        Ok(inner
            .job_executions
            .iter()
            .rev()
            .find(|e| e.job_instance().id() == instance.id())
            .cloned())
    }

    async fn get_job_executions(
        &self,
        job_instance: JobInstanceId,
    ) -> CoreResult<Vec<JobExecution>> {
        let inner = self.inner.read().await;
        Ok(inner
            .job_executions
            .iter()
            .filter(|e| e.job_instance().id() == job_instance)
            .cloned()
            .collect())
    }
}
