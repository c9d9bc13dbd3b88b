//! Lifecycle and reporting statuses for executions.

mod batch;
mod exit;

pub use batch::BatchStatus;
pub use exit::ExitStatus;
