//! Idempotent alert ingestion.
//!
//! A firing alert becomes exactly one session per `(identity, startsAt)`.
//! Redeliveries of the same firing are reported as duplicates and point at
//! the existing session. Sessions are started on their own task and wait
//! for a concurrency permit while sitting in `RECEIVED`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use super::types::{AlertmanagerAlert, AlertmanagerPayload};
use crate::config::IngestConfig;
use crate::error::ProtocolError;
use crate::session::{Incident, Orchestrator};

/// What happened to one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum IngestDecision {
    /// A new session was started
    Created {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Same firing already has a session
    Duplicate {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Alert was acknowledged but not acted on
    Ignored { reason: String },
}

/// Totals for one webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub processed: usize,
    pub created: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub session_ids: Vec<String>,
    pub errors: Vec<String>,
}

/// Upper bound on dedup retention (about a century).
const MAX_RETENTION_HOURS: i64 = 876_000;

#[derive(Debug, Clone)]
struct Seen {
    session_id: String,
    seen_at: DateTime<Utc>,
}

/// Turns alerts into sessions, at most once per firing.
#[derive(Clone)]
pub struct AlertIngestor {
    orchestrator: Orchestrator,
    seen: Arc<Mutex<HashMap<(String, DateTime<Utc>), Seen>>>,
    permits: Arc<Semaphore>,
    retention: chrono::Duration,
    default_namespace: String,
}

impl AlertIngestor {
    pub fn new(orchestrator: Orchestrator, config: &IngestConfig) -> Self {
        let retention_hours = i64::try_from(config.dedup_retention_hours)
            .unwrap_or(MAX_RETENTION_HOURS)
            .min(MAX_RETENTION_HOURS);
        Self {
            orchestrator,
            seen: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            retention: chrono::Duration::hours(retention_hours),
            default_namespace: config.default_namespace.clone(),
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Process a whole webhook delivery.
    pub async fn ingest(&self, payload: AlertmanagerPayload) -> IngestSummary {
        info!(
            alerts = payload.alerts.len(),
            status = %payload.status,
            "Received alert webhook"
        );

        let mut summary = IngestSummary::default();
        for alert in payload.alerts {
            summary.processed += 1;
            let name = alert.name().to_string();
            match self.ingest_alert(alert).await {
                Ok(IngestDecision::Created { session_id }) => {
                    summary.created += 1;
                    summary.session_ids.push(session_id);
                }
                Ok(IngestDecision::Duplicate { session_id }) => {
                    summary.duplicates += 1;
                    summary.session_ids.push(session_id);
                }
                Ok(IngestDecision::Ignored { .. }) => summary.ignored += 1,
                Err(e) => {
                    error!(alert = %name, error = %e, "Failed to ingest alert");
                    summary.errors.push(format!("{name}: {e}"));
                }
            }
        }
        summary
    }

    /// Process one alert.
    pub async fn ingest_alert(
        &self,
        alert: AlertmanagerAlert,
    ) -> Result<IngestDecision, ProtocolError> {
        if !alert.is_firing() {
            debug!(alert = %alert.name(), status = %alert.status, "Ignoring non-firing alert");
            return Ok(IngestDecision::Ignored {
                reason: format!("alert status is '{}'", alert.status),
            });
        }

        let identity = alert.identity();
        let dedup_key = (identity.clone(), alert.starts_at);
        let incident = Incident::new(
            alert.name(),
            identity,
            alert.sorted_labels(),
            alert
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            alert.starts_at,
            &self.default_namespace,
        );

        {
            let mut seen = self.seen.lock().await;
            let cutoff = Utc::now() - self.retention;
            seen.retain(|_, entry| entry.seen_at > cutoff);

            // Retention counts from the latest delivery of this firing.
            if let Some(existing) = seen.get_mut(&dedup_key) {
                existing.seen_at = Utc::now();
                info!(
                    alert = %incident.alert_name,
                    session_id = %existing.session_id,
                    "Duplicate alert delivery"
                );
                return Ok(IngestDecision::Duplicate {
                    session_id: existing.session_id.clone(),
                });
            }
            seen.insert(
                dedup_key.clone(),
                Seen {
                    session_id: incident.id.clone(),
                    seen_at: Utc::now(),
                },
            );
        }

        let session_id = incident.id.clone();
        let mut session = match self.orchestrator.open(incident).await {
            Ok(session) => session,
            Err(e) => {
                self.seen.lock().await.remove(&dedup_key);
                return Err(e);
            }
        };

        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(session_id = %session.id(), "Session semaphore closed");
                return;
            };
            session.drive().await;
        });

        Ok(IngestDecision::Created { session_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::context::MemoryContextStore;
    use crate::session::{Collaborators, SessionRegistry, SessionSettings};
    use crate::tools::executor::MockCommandRunner;
    use crate::tools::{CommandExecutor, CommandValidator};
    use serde_json::json;
    use std::time::Duration;

    fn ingestor(config: &IngestConfig) -> AlertIngestor {
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryContextStore::new()),
            SessionRegistry::new(),
            CommandValidator::new(&ValidatorConfig::default()),
            CommandExecutor::new(Arc::new(MockCommandRunner::new()), Duration::from_secs(1)),
            Collaborators::default(),
            SessionSettings::default(),
        );
        AlertIngestor::new(orchestrator, config)
    }

    fn alert(status: &str, fingerprint: &str, starts_at: &str) -> AlertmanagerAlert {
        serde_json::from_value(json!({
            "status": status,
            "labels": {"alertname": "HighQueueDepth", "service": "svc-b"},
            "startsAt": starts_at,
            "fingerprint": fingerprint,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_refiring_creates_new_session() {
        let ingestor = ingestor(&IngestConfig::default());

        let first = ingestor
            .ingest_alert(alert("firing", "abc", "2026-03-01T10:00:00Z"))
            .await
            .unwrap();
        let again = ingestor
            .ingest_alert(alert("firing", "abc", "2026-03-01T10:00:00Z"))
            .await
            .unwrap();
        let refired = ingestor
            .ingest_alert(alert("firing", "abc", "2026-03-01T12:00:00Z"))
            .await
            .unwrap();

        let IngestDecision::Created { session_id } = first else {
            panic!("expected a new session");
        };
        assert_eq!(again, IngestDecision::Duplicate { session_id: session_id.clone() });
        assert!(matches!(refired, IngestDecision::Created { session_id: ref id } if *id != session_id));
        assert_eq!(ingestor.orchestrator().registry().list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_payload_summary_counts() {
        let ingestor = ingestor(&IngestConfig::default());
        let payload: AlertmanagerPayload = serde_json::from_value(json!({
            "status": "firing",
            "alerts": [
                {"status": "firing", "labels": {"alertname": "A"}, "startsAt": "2026-03-01T10:00:00Z", "fingerprint": "a"},
                {"status": "firing", "labels": {"alertname": "A"}, "startsAt": "2026-03-01T10:00:00Z", "fingerprint": "a"},
                {"status": "resolved", "labels": {"alertname": "B"}, "startsAt": "2026-03-01T10:00:00Z", "fingerprint": "b"}
            ]
        }))
        .unwrap();

        let summary = ingestor.ingest(payload).await;
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.session_ids[0], summary.session_ids[1]);
        assert!(summary.errors.is_empty());
    }

    async fn backdate(ingestor: &AlertIngestor, hours: i64) {
        for entry in ingestor.seen.lock().await.values_mut() {
            entry.seen_at -= chrono::Duration::hours(hours);
        }
    }

    #[tokio::test]
    async fn test_redelivery_extends_dedup_retention() {
        let ingestor = ingestor(&IngestConfig::default());
        let firing = || alert("firing", "abc", "2026-03-01T10:00:00Z");

        let IngestDecision::Created { session_id } = ingestor.ingest_alert(firing()).await.unwrap()
        else {
            panic!("expected a new session");
        };

        backdate(&ingestor, 23).await;
        assert_eq!(
            ingestor.ingest_alert(firing()).await.unwrap(),
            IngestDecision::Duplicate { session_id: session_id.clone() }
        );

        // Over a day since the first delivery, but only two hours since the last.
        backdate(&ingestor, 2).await;
        assert_eq!(
            ingestor.ingest_alert(firing()).await.unwrap(),
            IngestDecision::Duplicate { session_id }
        );
        assert_eq!(ingestor.orchestrator().registry().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_retention_forgets_immediately() {
        let config = IngestConfig {
            dedup_retention_hours: 0,
            ..IngestConfig::default()
        };
        let ingestor = ingestor(&config);

        ingestor
            .ingest_alert(alert("firing", "abc", "2026-03-01T10:00:00Z"))
            .await
            .unwrap();
        let second = ingestor
            .ingest_alert(alert("firing", "abc", "2026-03-01T10:00:00Z"))
            .await
            .unwrap();
        assert!(matches!(second, IngestDecision::Created { .. }));
    }

    #[tokio::test]
    async fn test_sessions_without_collaborators_fail_cleanly() {
        let ingestor = ingestor(&IngestConfig::default());
        let IngestDecision::Created { session_id } = ingestor
            .ingest_alert(alert("firing", "abc", "2026-03-01T10:00:00Z"))
            .await
            .unwrap()
        else {
            panic!("expected a new session");
        };

        let registry = ingestor.orchestrator().registry();
        for _ in 0..100 {
            if registry.active_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let summary = registry.get(&session_id).await.unwrap();
        assert_eq!(summary.phase, crate::session::Phase::Failed);
        assert_eq!(
            summary.failure_kind,
            Some(crate::session::FailureKind::CollaboratorUnavailable)
        );
    }
}
