//! Flow execution engine.
//!
//! This module provides the runtime pieces a flow runs on:
//! - [`FlowExecutor`]: per-job-execution context handed to every state
//! - [`TaskExecutor`]: facility running split branches and partitions
//! - [`SplitCoordinator`]: fan-out/join of concurrent sub-flows
//! - [`EngineConfig`]: configuration options

mod config;
mod executor;
mod handler;
mod split;
mod task;

pub use config::{EngineConfig, EngineConfigBuilder, EngineConfigBuilderError};
pub use executor::FlowExecutor;
pub(crate) use handler::run_step;
pub use split::SplitCoordinator;
pub(crate) use task::submit;
pub use task::{SyncTaskExecutor, TaskExecutor, TaskHandle, TokioTaskExecutor};
