//! Session domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Phase;
use crate::collaborators::messages::VerificationResponse;
use crate::error::{CollaboratorError, StoreError};
use crate::tools::{ErrorKind, ExecutionRecord};

/// An alert occurrence being remediated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Session identifier (UUID v4)
    pub id: String,
    pub alert_name: String,
    /// Alertmanager fingerprint, or a derived identity when absent
    pub fingerprint: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// When the alert started firing
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Namespace commands default to
    pub namespace: String,
}

impl Incident {
    /// Create an incident with a fresh session id.
    ///
    /// The namespace comes from the `namespace` label, else `default_namespace`.
    pub fn new(
        alert_name: impl Into<String>,
        fingerprint: impl Into<String>,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
        starts_at: DateTime<Utc>,
        default_namespace: &str,
    ) -> Self {
        let namespace = labels
            .get("namespace")
            .cloned()
            .unwrap_or_else(|| default_namespace.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            alert_name: alert_name.into(),
            fingerprint: fingerprint.into(),
            labels,
            annotations,
            starts_at,
            created_at: Utc::now(),
            namespace,
        }
    }
}

/// Overall result of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Verified resolved and every command succeeded
    Resolved,
    /// Some commands failed
    PartiallyRemediated,
    /// Every command succeeded but the condition persists
    NotResolved,
}

impl Outcome {
    /// Derive the outcome from execution records and verification.
    #[must_use]
    pub fn from_results(executions: &[ExecutionRecord], resolved: bool) -> Self {
        let any_failed = executions.iter().any(|r| !r.succeeded());
        match (resolved, any_failed) {
            (_, true) => Self::PartiallyRemediated,
            (true, false) => Self::Resolved,
            (false, false) => Self::NotResolved,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::PartiallyRemediated => "partially-remediated",
            Self::NotResolved => "not-resolved",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executed command line with its result, as shown in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedCommand {
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl From<&ExecutionRecord> for ExecutedCommand {
    fn from(record: &ExecutionRecord) -> Self {
        Self {
            command: record.command_line.clone(),
            success: record.succeeded(),
            error_kind: record.result.error_kind(),
        }
    }
}

/// Final report of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub incident_id: String,
    pub alert_name: String,
    /// Diagnosis summary
    pub summary: String,
    /// Why the plan was expected to help
    pub diagnosis: String,
    pub commands_executed: Vec<ExecutedCommand>,
    pub outcome: Outcome,
    pub verification: VerificationResponse,
    /// Rendered content from the report collaborator
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

/// Why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    DiagnosisIncomplete,
    UnsafePlan,
    ExecutionFailed,
    CollaboratorTimeout,
    MalformedResponse,
    CollaboratorError,
    CollaboratorUnavailable,
    StoreFailure,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiagnosisIncomplete => "diagnosis-incomplete",
            Self::UnsafePlan => "unsafe-plan",
            Self::ExecutionFailed => "execution-failed",
            Self::CollaboratorTimeout => "collaborator-timeout",
            Self::MalformedResponse => "malformed-response",
            Self::CollaboratorError => "collaborator-error",
            Self::CollaboratorUnavailable => "collaborator-unavailable",
            Self::StoreFailure => "store-failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&CollaboratorError> for FailureKind {
    fn from(error: &CollaboratorError) -> Self {
        match error {
            CollaboratorError::Timeout { .. } => Self::CollaboratorTimeout,
            CollaboratorError::Malformed { .. } => Self::MalformedResponse,
            CollaboratorError::Transport { .. } | CollaboratorError::Unavailable(_) => {
                Self::CollaboratorUnavailable
            }
            CollaboratorError::Failed { .. } => Self::CollaboratorError,
        }
    }
}

impl From<&StoreError> for FailureKind {
    fn from(_: &StoreError) -> Self {
        Self::StoreFailure
    }
}

/// Terminal record of a failed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Furthest phase the session reached
    pub furthest_phase: Phase,
    /// Phase the failure occurred in
    pub failed_from: Phase,
    pub kind: FailureKind,
    pub cause: String,
    pub failed_at: DateTime<Utc>,
    /// Rendered plain-text summary
    pub summary: String,
}
