//! Registry of session summaries, addressable by session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::{FailureKind, Incident, Outcome};
use super::Phase;
use crate::error::ProtocolError;

/// Status snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub alert_name: String,
    pub fingerprint: String,
    pub namespace: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    #[must_use]
    pub fn for_incident(incident: &Incident) -> Self {
        Self {
            session_id: incident.id.clone(),
            alert_name: incident.alert_name.clone(),
            fingerprint: incident.fingerprint.clone(),
            namespace: incident.namespace.clone(),
            phase: Phase::Received,
            outcome: None,
            failure_kind: None,
            created_at: incident.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// Shared registry handle. Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionSummary>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new session. Fails if the id is already registered.
    pub async fn register(&self, summary: SessionSummary) -> Result<(), ProtocolError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&summary.session_id) {
            return Err(ProtocolError::DuplicateSession(summary.session_id));
        }
        sessions.insert(summary.session_id.clone(), summary);
        Ok(())
    }

    /// Apply `f` to a registered session.
    pub async fn update(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionSummary),
    ) -> Result<(), ProtocolError> {
        let mut sessions = self.sessions.write().await;
        let summary = sessions
            .get_mut(session_id)
            .ok_or_else(|| ProtocolError::UnknownSession(session_id.to_string()))?;
        f(summary);
        summary.updated_at = Utc::now();
        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionSummary> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// All sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionSummary> = sessions.values().cloned().collect();
        list.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        list
    }

    /// Number of sessions not yet in a terminal phase.
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.phase.is_terminal())
            .count()
    }
}
