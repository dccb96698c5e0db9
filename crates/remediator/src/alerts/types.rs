//! Alertmanager webhook types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};

/// Alertmanager webhook payload.
///
/// Reference: <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    /// Version of the payload format
    #[serde(default)]
    pub version: String,
    /// Unique identifier for this group of alerts
    #[serde(default)]
    pub group_key: String,
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Receiver that matched this alert
    #[serde(default)]
    pub receiver: String,
    /// Labels common to all alerts
    #[serde(default)]
    pub common_labels: HashMap<String, String>,
    /// List of alerts in this notification
    pub alerts: Vec<AlertmanagerAlert>,
}

/// Individual alert from Alertmanager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Status: "firing" or "resolved"
    pub status: String,
    /// Alert labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Alert annotations
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// When the alert started firing
    pub starts_at: DateTime<Utc>,
    /// When the alert was resolved (if resolved)
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// URL to the alert in Alertmanager
    #[serde(default)]
    pub generator_url: String,
    /// Unique fingerprint for this alert
    #[serde(default)]
    pub fingerprint: String,
}

impl AlertmanagerAlert {
    /// Get the alert name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.labels.get("alertname").map_or("unknown", String::as_str)
    }

    /// Check if this is a firing alert.
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.status == "firing"
    }

    /// Labels in sorted order.
    #[must_use]
    pub fn sorted_labels(&self) -> BTreeMap<String, String> {
        self.labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Stable alert identity: the fingerprint, or a SHA-1 over the alert
    /// name and sorted labels when Alertmanager sent none.
    #[must_use]
    pub fn identity(&self) -> String {
        if !self.fingerprint.is_empty() {
            return self.fingerprint.clone();
        }
        let mut hasher = Sha1::new();
        hasher.update(self.name().as_bytes());
        for (key, value) in self.sorted_labels() {
            hasher.update(b"\n");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
