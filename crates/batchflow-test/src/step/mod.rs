//! Step doubles.
//!
//! Every double counts how often it ran, so tests can assert that a step was
//! skipped on restart or never reached.

mod behavior;
mod scripted;
mod stub;

pub use behavior::{FailingStep, SleepStep, TerminateOnlyStep};
pub use scripted::ScriptedStep;
pub use stub::StubStep;
