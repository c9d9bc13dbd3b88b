//! Exit status reporting codes.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reporting code of a finished (or running) execution.
///
/// The exit code is a free-form string: the well-known codes are exposed as
/// associated constants, anything else is a custom code. Flow transitions
/// match their patterns against the exit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitStatus {
    exit_code: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "str::is_empty")]
    exit_description: Cow<'static, str>,
}

impl ExitStatus {
    /// Unknown state, assumed to be still running.
    pub const UNKNOWN: Self = Self::from_static("UNKNOWN");
    /// Processing is still in progress.
    pub const EXECUTING: Self = Self::from_static("EXECUTING");
    /// Processing finished.
    pub const COMPLETED: Self = Self::from_static("COMPLETED");
    /// Nothing was done, for instance a step that was already complete.
    pub const NOOP: Self = Self::from_static("NOOP");
    /// Processing failed.
    pub const FAILED: Self = Self::from_static("FAILED");
    /// Processing stopped on request.
    pub const STOPPED: Self = Self::from_static("STOPPED");

    const fn from_static(code: &'static str) -> Self {
        Self {
            exit_code: Cow::Borrowed(code),
            exit_description: Cow::Borrowed(""),
        }
    }

    /// Creates an exit status with the given code and no description.
    pub fn new(exit_code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: Cow::Borrowed(""),
        }
    }

    /// Creates an exit status with the given code and description.
    pub fn with_description(
        exit_code: impl Into<Cow<'static, str>>,
        exit_description: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: exit_description.into(),
        }
    }

    /// Returns the exit code.
    #[inline]
    pub fn exit_code(&self) -> &str {
        &self.exit_code
    }

    /// Returns the exit description, empty when none was recorded.
    #[inline]
    pub fn exit_description(&self) -> &str {
        &self.exit_description
    }

    /// Returns whether the code signals work still in progress.
    pub fn is_running(&self) -> bool {
        self.exit_code == Self::EXECUTING.exit_code || self.exit_code == Self::UNKNOWN.exit_code
    }

    /// Returns a copy with the exit code replaced and the description kept.
    #[must_use]
    pub fn replace_exit_code(&self, exit_code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: self.exit_description.clone(),
        }
    }

    /// Returns a copy with `description` appended.
    ///
    /// Empty descriptions and a description equal to the current one are
    /// ignored; otherwise descriptions are joined with `"; "`.
    #[must_use]
    pub fn add_exit_description(&self, description: &str) -> Self {
        if description.is_empty() || self.exit_description == description {
            return self.clone();
        }
        let exit_description = if self.exit_description.is_empty() {
            description.to_owned()
        } else {
            format!("{}; {}", self.exit_description, description)
        };
        Self {
            exit_code: self.exit_code.clone(),
            exit_description: Cow::Owned(exit_description),
        }
    }

    /// Combines two statuses, keeping the more severe exit code.
    ///
    /// Severity runs `EXECUTING < COMPLETED < NOOP < STOPPED < FAILED <
    /// UNKNOWN < custom`; equally severe codes are ordered by their text.
    /// Descriptions of both sides are kept.
    #[must_use]
    pub fn and(&self, other: &ExitStatus) -> Self {
        let result = self.add_exit_description(&other.exit_description);
        if self.cmp_severity(other) == Ordering::Less {
            result.replace_exit_code(other.exit_code.clone())
        } else {
            result
        }
    }

    /// Compares two statuses by severity, then by code.
    pub fn cmp_severity(&self, other: &ExitStatus) -> Ordering {
        self.severity()
            .cmp(&other.severity())
            .then_with(|| self.exit_code.cmp(&other.exit_code))
    }

    fn severity(&self) -> u8 {
        match self.exit_code.as_ref() {
            "EXECUTING" => 1,
            "COMPLETED" => 2,
            "NOOP" => 3,
            "STOPPED" => 4,
            "FAILED" => 5,
            "UNKNOWN" => 6,
            _ => 7,
        }
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::EXECUTING
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exit_description.is_empty() {
            f.write_str(&self.exit_code)
        } else {
            write!(f, "{} ({})", self.exit_code, self.exit_description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_keeps_more_severe_code() {
        assert_eq!(
            ExitStatus::COMPLETED.and(&ExitStatus::FAILED).exit_code(),
            "FAILED"
        );
        assert_eq!(
            ExitStatus::FAILED.and(&ExitStatus::COMPLETED).exit_code(),
            "FAILED"
        );
        assert_eq!(
            ExitStatus::FAILED.and(&ExitStatus::EXECUTING).exit_code(),
            "FAILED"
        );
    }

    #[test]
    fn and_prefers_custom_codes() {
        let custom = ExitStatus::EXECUTING.replace_exit_code("CUSTOM");
        assert_eq!(ExitStatus::EXECUTING.and(&custom).exit_code(), "CUSTOM");
        assert_eq!(ExitStatus::COMPLETED.and(&custom).exit_code(), "CUSTOM");
    }

    #[test]
    fn and_merges_descriptions() {
        let a = ExitStatus::with_description("COMPLETED", "first");
        let b = ExitStatus::with_description("FAILED", "second");
        let merged = a.and(&b);
        assert_eq!(merged.exit_code(), "FAILED");
        assert_eq!(merged.exit_description(), "first; second");
    }

    #[test]
    fn add_description_skips_duplicates_and_empty() {
        let status = ExitStatus::EXECUTING
            .add_exit_description("Foo")
            .add_exit_description("Foo")
            .add_exit_description("");
        assert_eq!(status.exit_description(), "Foo");
    }

    #[test]
    fn replace_code_keeps_description() {
        let status = ExitStatus::with_description("BAR", "Bar").replace_exit_code("FOO");
        assert_eq!(status.exit_code(), "FOO");
        assert_eq!(status.exit_description(), "Bar");
    }

    #[test]
    fn running_codes() {
        assert!(ExitStatus::UNKNOWN.is_running());
        assert!(ExitStatus::EXECUTING.is_running());
        assert!(!ExitStatus::COMPLETED.is_running());
    }
}
