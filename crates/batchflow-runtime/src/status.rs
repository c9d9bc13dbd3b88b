//! Flow outcome statuses.

use std::fmt;

use batchflow_core::{BatchStatus, ExitStatus};
use serde::{Deserialize, Serialize};

/// Outcome of a state or of a whole flow.
///
/// Transitions match on [`FlowExecutionStatus::name`], the literal outcome
/// code. The severity ordering `UNKNOWN < FAILED < STOPPED < COMPLETED` is
/// only used when several outcomes are merged into one, for instance the
/// branches of a split. Custom codes rank by their prefix (`FAILED_X` ranks as
/// `FAILED`) and anything else ranks as `COMPLETED`.
///
/// Use [`FlowExecutionStatus::new`] to build a status from a code so that the
/// well-known codes map onto their variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlowExecutionStatus {
    /// The flow or state finished successfully.
    Completed,
    /// The flow or state stopped and may be restarted.
    Stopped,
    /// The flow or state failed.
    Failed,
    /// The outcome could not be determined.
    #[default]
    Unknown,
    /// A custom outcome, typically returned by a decider.
    Custom(String),
}

impl FlowExecutionStatus {
    /// Creates a status from an outcome code.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "COMPLETED" => Self::Completed,
            "STOPPED" => Self::Stopped,
            "FAILED" => Self::Failed,
            "UNKNOWN" => Self::Unknown,
            _ => Self::Custom(name),
        }
    }

    /// Returns the literal outcome code.
    pub fn name(&self) -> &str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
            Self::Custom(name) => name,
        }
    }

    /// Returns whether the status ranks as stopped.
    pub fn is_stop(&self) -> bool {
        self.rank() == Self::Stopped.rank()
    }

    /// Returns whether the status ranks as failed.
    pub fn is_fail(&self) -> bool {
        self.rank() == Self::Failed.rank()
    }

    /// Returns whether the status ranks as unknown.
    pub fn is_unknown(&self) -> bool {
        self.rank() == 0
    }

    /// Returns whether `self` is strictly worse than `other`.
    pub fn is_worse_than(&self, other: &Self) -> bool {
        self.rank() < other.rank()
    }

    /// Returns the worst status, keeping the first one on ties.
    ///
    /// Returns `None` when there is nothing to aggregate.
    pub fn worst<'a>(statuses: impl IntoIterator<Item = &'a Self>) -> Option<Self> {
        statuses
            .into_iter()
            .fold(None::<&Self>, |worst, status| match worst {
                Some(current) if !status.is_worse_than(current) => Some(current),
                _ => Some(status),
            })
            .cloned()
    }

    /// Returns the batch status a job ends with for this outcome.
    ///
    /// The outcome code is matched by prefix against the batch status names,
    /// so `COMPLETED_WITH_SKIPS` maps to `COMPLETED`. Codes matching no
    /// batch status map to `COMPLETED`.
    pub fn batch_status(&self) -> BatchStatus {
        const CANDIDATES: [BatchStatus; 8] = [
            BatchStatus::Completed,
            BatchStatus::Starting,
            BatchStatus::Started,
            BatchStatus::Stopping,
            BatchStatus::Stopped,
            BatchStatus::Failed,
            BatchStatus::Abandoned,
            BatchStatus::Unknown,
        ];

        let name = self.name();
        CANDIDATES
            .into_iter()
            .find(|status| {
                let code: &str = status.as_ref();
                name.starts_with(code)
            })
            .unwrap_or(BatchStatus::Completed)
    }

    fn rank(&self) -> u8 {
        let name = self.name();
        if name.starts_with("UNKNOWN") {
            0
        } else if name.starts_with("FAILED") {
            1
        } else if name.starts_with("STOPPED") {
            2
        } else {
            3
        }
    }
}

impl fmt::Display for FlowExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for FlowExecutionStatus {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for FlowExecutionStatus {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<FlowExecutionStatus> for String {
    fn from(status: FlowExecutionStatus) -> Self {
        match status {
            FlowExecutionStatus::Custom(name) => name,
            other => other.name().to_owned(),
        }
    }
}

impl From<&ExitStatus> for FlowExecutionStatus {
    fn from(exit_status: &ExitStatus) -> Self {
        Self::new(exit_status.exit_code())
    }
}

/// Final outcome of one flow run: the last state visited and its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowExecution {
    name: String,
    status: FlowExecutionStatus,
}

impl FlowExecution {
    /// Creates a flow execution result.
    pub fn new(name: impl Into<String>, status: FlowExecutionStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    /// Returns the name of the last state visited.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the terminal status.
    #[inline]
    pub fn status(&self) -> &FlowExecutionStatus {
        &self.status
    }
}

impl fmt::Display for FlowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_maps_well_known_codes() {
        assert_eq!(FlowExecutionStatus::new("FAILED"), FlowExecutionStatus::Failed);
        assert_eq!(
            FlowExecutionStatus::new("ONGOING"),
            FlowExecutionStatus::Custom("ONGOING".into())
        );
        assert_eq!(FlowExecutionStatus::Custom("ONGOING".into()).name(), "ONGOING");
    }

    #[test]
    fn worst_of_every_combination() {
        use FlowExecutionStatus::{Completed, Failed, Stopped};

        let rank = |s: &FlowExecutionStatus| match s {
            Failed => 0,
            Stopped => 1,
            _ => 2,
        };
        let all = [Completed, Stopped, Failed];
        for a in &all {
            for b in &all {
                for c in &all {
                    let branches = [a.clone(), b.clone(), c.clone()];
                    let expected = branches.iter().min_by_key(|s| rank(s)).cloned();
                    assert_eq!(FlowExecutionStatus::worst(&branches), expected);
                }
            }
        }
    }

    #[test]
    fn worst_of_nothing_is_none() {
        assert_eq!(FlowExecutionStatus::worst(&[]), None);
    }

    #[test]
    fn custom_codes_rank_as_completed_unless_prefixed() {
        let ongoing = FlowExecutionStatus::new("ONGOING");
        let worst = FlowExecutionStatus::worst(&[ongoing.clone(), FlowExecutionStatus::Completed]);
        assert_eq!(worst, Some(ongoing));

        let failed_custom = FlowExecutionStatus::new("FAILED_HARD");
        assert!(failed_custom.is_fail());
        assert!(failed_custom.is_worse_than(&FlowExecutionStatus::Stopped));
        assert!(FlowExecutionStatus::Unknown.is_worse_than(&failed_custom));
    }

    #[test]
    fn batch_status_by_prefix() {
        assert_eq!(
            FlowExecutionStatus::new("COMPLETED_WITH_SKIPS").batch_status(),
            BatchStatus::Completed
        );
        assert_eq!(FlowExecutionStatus::Stopped.batch_status(), BatchStatus::Stopped);
        assert_eq!(FlowExecutionStatus::Unknown.batch_status(), BatchStatus::Unknown);
        assert_eq!(
            FlowExecutionStatus::new("ONGOING").batch_status(),
            BatchStatus::Completed
        );
    }
}
