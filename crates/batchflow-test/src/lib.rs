#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod logging;
mod step;

pub use logging::init_tracing;
pub use step::{FailingStep, ScriptedStep, SleepStep, StubStep, TerminateOnlyStep};
