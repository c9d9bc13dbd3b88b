//! Batch status lifecycle.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle status of a job or step execution.
///
/// Variants are declared in increasing order of severity, so the derived
/// ordering can be used to pick the "worst" of two statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// The execution finished successfully.
    Completed,
    /// The execution has been created but not started.
    #[default]
    Starting,
    /// The execution is running.
    Started,
    /// A stop was requested and the execution is winding down.
    Stopping,
    /// The execution stopped before finishing and may be restarted.
    Stopped,
    /// The execution failed.
    Failed,
    /// The execution was abandoned and must not be restarted.
    Abandoned,
    /// The execution ended in a state that could not be determined.
    Unknown,
}

impl BatchStatus {
    /// Returns whether the status describes a running execution.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Started | Self::Stopping)
    }

    /// Returns whether the status is `Failed` or worse.
    #[inline]
    pub fn is_unsuccessful(self) -> bool {
        self >= Self::Failed
    }

    /// Returns whether the status is past `Started`.
    #[inline]
    fn is_finishing(self) -> bool {
        self > Self::Started
    }

    /// Combines this status with `other` without downgrading a failure.
    ///
    /// If either status is past `Started` the more severe one wins. Otherwise
    /// `Completed` wins over `Starting`/`Started`, so a completed execution is
    /// not dragged back into a running state.
    pub fn upgrade_to(self, other: Self) -> Self {
        if self.is_finishing() || other.is_finishing() {
            return self.max(other);
        }
        if self == Self::Completed || other == Self::Completed {
            return Self::Completed;
        }
        self.max(other)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn upgrade_keeps_most_severe_finished_status() {
        assert_eq!(
            BatchStatus::Failed.upgrade_to(BatchStatus::Completed),
            BatchStatus::Failed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Stopped),
            BatchStatus::Stopped
        );
        assert_eq!(
            BatchStatus::Stopped.upgrade_to(BatchStatus::Unknown),
            BatchStatus::Unknown
        );
    }

    #[test]
    fn upgrade_prefers_completed_over_running() {
        assert_eq!(
            BatchStatus::Started.upgrade_to(BatchStatus::Completed),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Starting),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Starting.upgrade_to(BatchStatus::Started),
            BatchStatus::Started
        );
    }

    #[test]
    fn running_and_unsuccessful() {
        assert!(BatchStatus::Stopping.is_running());
        assert!(!BatchStatus::Stopped.is_running());
        assert!(BatchStatus::Abandoned.is_unsuccessful());
        assert!(!BatchStatus::Stopped.is_unsuccessful());
    }

    #[test]
    fn string_round_trip() {
        assert_eq!(BatchStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(
            BatchStatus::from_str("ABANDONED").ok(),
            Some(BatchStatus::Abandoned)
        );
    }
}
