//! Core error types.

use thiserror::Error;

use crate::status::BatchStatus;

/// Result type for repository and execution-record operations.
pub type CoreResult<T, E = CoreError> = std::result::Result<T, E>;

/// Errors raised by the execution-record layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A job execution for the same instance is still running.
    #[error("a job execution for job '{job_name}' is already running")]
    JobExecutionAlreadyRunning {
        /// Name of the job.
        job_name: String,
    },

    /// The job instance already completed successfully.
    #[error("job instance for job '{job_name}' is already complete")]
    JobInstanceAlreadyComplete {
        /// Name of the job.
        job_name: String,
    },

    /// A restart was refused.
    #[error("cannot restart: {0}")]
    JobRestart(String),

    /// A step was started more often than its limit allows.
    #[error("maximum start limit exceeded for step '{step}': {limit}")]
    StartLimitExceeded {
        /// Name of the step.
        step: String,
        /// Configured start limit.
        limit: u32,
    },

    /// A step cannot be restarted from its last recorded status.
    #[error("cannot restart step '{step}' from {status} status")]
    InvalidRestartStatus {
        /// Name of the step.
        step: String,
        /// Status of the last execution.
        status: BatchStatus,
    },

    /// A record was not found.
    #[error("not found: {0}")]
    NotFound(String),
}
