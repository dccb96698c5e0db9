//! Built-in verifier backed by the Alertmanager v2 API.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{VerificationRequest, VerificationResponse};
use super::{Capability, CapabilityDescriptor, CapabilityRequest, OperationDescriptor, OP_VERIFY};
use crate::error::CollaboratorError;
use crate::tools::{ToolError, ToolResult};

const NAME: &str = "alertmanager-verifier";

/// Alert as returned by `GET /api/v2/alerts`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveAlert {
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Verifies resolution by asking Alertmanager whether the alert still fires.
#[derive(Debug, Clone)]
pub struct AlertmanagerVerifier {
    base_url: String,
    settle_delay: Duration,
    client: reqwest::Client,
}

impl AlertmanagerVerifier {
    /// `settle_delay` gives the remediation time to take effect and the
    /// alert rule time to re-evaluate before the check.
    pub fn new(base_url: impl Into<String>, settle_delay: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settle_delay,
            client: reqwest::Client::new(),
        }
    }

    async fn active_alerts(&self, alert_name: &str) -> Result<Vec<ActiveAlert>, CollaboratorError> {
        let url = format!("{}/api/v2/alerts", self.base_url);
        let filter = format!("alertname=\"{alert_name}\"");
        let response = self
            .client
            .get(&url)
            .query(&[("filter", filter.as_str()), ("active", "true")])
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport {
                capability: NAME.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Transport {
                capability: NAME.to_string(),
                message: format!("alertmanager returned status {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed(NAME, e))
    }
}

#[async_trait]
impl Capability for AlertmanagerVerifier {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Checks whether an alert is still active in Alertmanager".to_string(),
            operations: vec![OperationDescriptor::new(
                OP_VERIFY,
                "Resolved when no active alert matches the incident",
            )],
        }
    }

    async fn invoke(&self, request: CapabilityRequest) -> Result<ToolResult, CollaboratorError> {
        if request.operation != OP_VERIFY {
            return Ok(ToolResult::Failure(ToolError::invalid_input(format!(
                "unsupported operation '{}'",
                request.operation
            ))));
        }
        let verification: VerificationRequest = serde_json::from_value(request.payload)
            .map_err(|e| CollaboratorError::malformed(NAME, e))?;

        if !self.settle_delay.is_zero() {
            debug!(
                session_id = %request.session_id,
                secs = self.settle_delay.as_secs(),
                "Waiting for alert to settle"
            );
            tokio::time::sleep(self.settle_delay).await;
        }

        let alerts = self.active_alerts(&verification.alert_name).await?;
        let matching: Vec<&ActiveAlert> = alerts
            .iter()
            .filter(|a| {
                (!verification.fingerprint.is_empty() && a.fingerprint == verification.fingerprint)
                    || a.labels == verification.labels
            })
            .collect();
        let resolved = matching.is_empty();

        info!(
            session_id = %request.session_id,
            alert = %verification.alert_name,
            active = alerts.len(),
            matching = matching.len(),
            resolved,
            "Alertmanager verification"
        );

        let response = VerificationResponse {
            resolved,
            details: serde_json::json!({
                "source": "alertmanager",
                "activeAlerts": alerts.len(),
                "matchingAlerts": matching.iter().map(|a| a.fingerprint.as_str()).collect::<Vec<_>>(),
            }),
        };
        ToolResult::Success(response)
            .to_value_result()
            .map_err(|e| CollaboratorError::malformed(NAME, e))
    }
}
