//! Transitions between flow states.
//!
//! - [`StateTransition`]: one `(state, pattern) -> next` rule
//! - [`TransitionTable`]: the rules of a flow, ordered for resolution

mod pattern;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::pattern::matches;
pub use self::table::TransitionTable;

/// A rule moving a flow from one state to the next on a matching outcome.
///
/// A transition without a target is an end transition: the flow stops and
/// reports the outcome of its source state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateTransition {
    state: String,
    pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

impl StateTransition {
    /// Creates a transition from `state` to `next` on outcomes matching `pattern`.
    pub fn new(
        state: impl Into<String>,
        pattern: impl Into<String>,
        next: impl Into<String>,
    ) -> Self {
        Self {
            state: state.into(),
            pattern: pattern.into(),
            next: Some(next.into()),
        }
    }

    /// Creates an end transition for outcomes of `state` matching `pattern`.
    pub fn end(state: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            pattern: pattern.into(),
            next: None,
        }
    }

    /// Returns the source state name.
    #[inline]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns the outcome pattern.
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the target state name, `None` for end transitions.
    #[inline]
    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    /// Returns whether this transition ends the flow.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.next.is_none()
    }

    /// Returns whether the outcome code matches this transition's pattern.
    pub fn matches(&self, status: &str) -> bool {
        pattern::matches(&self.pattern, status)
    }

    /// Returns `(stars, question marks)` in the pattern; lower is more specific.
    pub fn specificity(&self) -> (usize, usize) {
        pattern::specificity(&self.pattern)
    }
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.next {
            Some(next) => write!(f, "{} -[{}]-> {}", self.state, self.pattern, next),
            None => write!(f, "{} -[{}]-> end", self.state, self.pattern),
        }
    }
}
