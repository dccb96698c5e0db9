//! Session lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a remediation session.
///
/// Phases advance strictly in declaration order; `Failed` is reachable from
/// any non-terminal phase. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Received,
    Diagnosing,
    PlanValidating,
    Executing,
    Verifying,
    Reporting,
    Complete,
    Failed,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Diagnosing => "DIAGNOSING",
            Self::PlanValidating => "PLAN_VALIDATING",
            Self::Executing => "EXECUTING",
            Self::Verifying => "VERIFYING",
            Self::Reporting => "REPORTING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// The phase that follows on success.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Diagnosing),
            Self::Diagnosing => Some(Self::PlanValidating),
            Self::PlanValidating => Some(Self::Executing),
            Self::Executing => Some(Self::Verifying),
            Self::Verifying => Some(Self::Reporting),
            Self::Reporting => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether `self -> to` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
