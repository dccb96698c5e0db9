//! Typed payloads exchanged with collaborators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::session::{Incident, Outcome};
use crate::tools::{ExecutionRecord, ProposedCommand, ProposedPlan, Verb};

/// Input to the diagnosis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRequest {
    pub incident_id: String,
    pub alert_name: String,
    pub fingerprint: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub scope: DiagnosisScope,
}

/// What the diagnosis collaborator may look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisScope {
    pub namespace: String,
    pub read_only_verbs: Vec<Verb>,
}

impl DiagnosisRequest {
    #[must_use]
    pub fn for_incident(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id.clone(),
            alert_name: incident.alert_name.clone(),
            fingerprint: incident.fingerprint.clone(),
            labels: incident.labels.clone(),
            annotations: incident.annotations.clone(),
            scope: DiagnosisScope {
                namespace: incident.namespace.clone(),
                read_only_verbs: Verb::ALL
                    .into_iter()
                    .filter(|v| !v.is_mutating())
                    .collect(),
            },
        }
    }
}

/// Output of the diagnosis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum DiagnosisResponse {
    /// Root cause found and a plan proposed
    Plan {
        summary: String,
        #[serde(default)]
        rationale: String,
        #[serde(default)]
        commands: Vec<ProposedCommand>,
    },
    /// No actionable diagnosis
    CannotDiagnose { reason: String },
}

impl DiagnosisResponse {
    /// The proposed plan, if any.
    #[must_use]
    pub fn proposed_plan(&self) -> Option<ProposedPlan> {
        match self {
            Self::Plan {
                rationale,
                commands,
                ..
            } => Some(ProposedPlan {
                rationale: rationale.clone(),
                commands: commands.clone(),
            }),
            Self::CannotDiagnose { .. } => None,
        }
    }
}

/// Input to the verification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub incident_id: String,
    pub alert_name: String,
    pub fingerprint: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Human description of the state that counts as resolved
    pub expected_condition: String,
}

impl VerificationRequest {
    #[must_use]
    pub fn for_incident(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id.clone(),
            alert_name: incident.alert_name.clone(),
            fingerprint: incident.fingerprint.clone(),
            namespace: incident.namespace.clone(),
            labels: incident.labels.clone(),
            expected_condition: format!("alert {} is no longer firing", incident.alert_name),
        }
    }
}

/// Output of the verification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub resolved: bool,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Input to the report collaborator: the full session transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest<'a> {
    pub incident: &'a Incident,
    pub diagnosis: &'a DiagnosisResponse,
    pub plan_rationale: &'a str,
    pub executions: &'a [ExecutionRecord],
    pub verification: &'a VerificationResponse,
    pub outcome: Outcome,
}

/// Output of the report collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub content: String,
}
