//! Remediation plans.

use serde::{Deserialize, Serialize};

use super::command::{ProposedCommand, ValidatedCommand};

/// Plan as proposed by the diagnosis collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedPlan {
    /// Why these commands should fix the incident
    #[serde(default)]
    pub rationale: String,
    /// Commands in execution order
    #[serde(default)]
    pub commands: Vec<ProposedCommand>,
}

/// An accepted plan. Holds only validated commands and cannot be modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationPlan {
    rationale: String,
    commands: Vec<ValidatedCommand>,
}

impl RemediationPlan {
    pub(crate) fn new(rationale: String, commands: Vec<ValidatedCommand>) -> Self {
        Self {
            rationale,
            commands,
        }
    }

    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    #[must_use]
    pub fn commands(&self) -> &[ValidatedCommand] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
