//! Remediator configuration.
//!
//! Loaded from `remediator-config.json` (camelCase). Every field has a
//! default, so a missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::tools::{PatchField, ResourceKind, Verb};

/// Default config file name.
pub const DEFAULT_CONFIG_PATH: &str = "remediator-config.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediatorConfig {
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl RemediatorConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Apply `ALERTMANAGER_URL` and `REMEDIATOR_STORE_DIR` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("ALERTMANAGER_URL") {
            if !url.is_empty() {
                self.collaborators.alertmanager_url = url;
            }
        }
        if let Ok(dir) = std::env::var("REMEDIATOR_STORE_DIR") {
            if !dir.is_empty() {
                self.store.backend = StoreBackend::File;
                self.store.dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.max_concurrent_sessions == 0 {
            return Err(ConfigError::Invalid(
                "ingest.maxConcurrentSessions must be at least 1".to_string(),
            ));
        }
        if self.validator.allowed_verbs.is_empty() {
            return Err(ConfigError::Invalid(
                "validator.allowedVerbs must not be empty".to_string(),
            ));
        }
        if self.validator.allowed_kinds.is_empty() {
            return Err(ConfigError::Invalid(
                "validator.allowedKinds must not be empty".to_string(),
            ));
        }
        if self.collaborators.verification == VerificationMode::Http
            && self.collaborators.verification_url.is_none()
        {
            return Err(ConfigError::Invalid(
                "collaborators.verificationUrl is required when verification is http".to_string(),
            ));
        }
        for (field, secs) in [
            ("timeouts.commandSecs", self.timeouts.command_secs),
            ("timeouts.diagnosisSecs", self.timeouts.diagnosis_secs),
            ("timeouts.verificationSecs", self.timeouts.verification_secs),
            ("timeouts.reportSecs", self.timeouts.report_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
            }
        }
        // The Alertmanager verifier sleeps out the settle delay inside the
        // verification deadline.
        if self.collaborators.verification == VerificationMode::Alertmanager
            && self.collaborators.settle_delay_secs >= self.timeouts.verification_secs
        {
            return Err(ConfigError::Invalid(format!(
                "collaborators.settleDelaySecs ({}) must be below timeouts.verificationSecs ({})",
                self.collaborators.settle_delay_secs, self.timeouts.verification_secs
            )));
        }
        Ok(())
    }
}

/// Per-call deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,
    #[serde(default = "default_diagnosis_secs")]
    pub diagnosis_secs: u64,
    #[serde(default = "default_verification_secs")]
    pub verification_secs: u64,
    #[serde(default = "default_report_secs")]
    pub report_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: default_command_secs(),
            diagnosis_secs: default_diagnosis_secs(),
            verification_secs: default_verification_secs(),
            report_secs: default_report_secs(),
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub fn diagnosis(&self) -> Duration {
        Duration::from_secs(self.diagnosis_secs)
    }

    #[must_use]
    pub fn verification(&self) -> Duration {
        Duration::from_secs(self.verification_secs)
    }

    #[must_use]
    pub fn report(&self) -> Duration {
        Duration::from_secs(self.report_secs)
    }
}

fn default_command_secs() -> u64 {
    60
}

fn default_diagnosis_secs() -> u64 {
    120
}

fn default_verification_secs() -> u64 {
    60
}

fn default_report_secs() -> u64 {
    120
}

/// Command validator allowlists and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorConfig {
    #[serde(default = "default_allowed_verbs")]
    pub allowed_verbs: Vec<Verb>,
    #[serde(default = "default_allowed_kinds")]
    pub allowed_kinds: Vec<ResourceKind>,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
    #[serde(default = "default_patch_fields")]
    pub patch_fields: Vec<PatchField>,
    /// Accept plans containing only read-only verbs
    #[serde(default)]
    pub allow_read_only_plans: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            allowed_verbs: default_allowed_verbs(),
            allowed_kinds: default_allowed_kinds(),
            max_replicas: default_max_replicas(),
            patch_fields: default_patch_fields(),
            allow_read_only_plans: false,
        }
    }
}

fn default_allowed_verbs() -> Vec<Verb> {
    Verb::ALL.to_vec()
}

fn default_allowed_kinds() -> Vec<ResourceKind> {
    vec![ResourceKind::Deployment, ResourceKind::Pod]
}

fn default_max_replicas() -> u32 {
    20
}

fn default_patch_fields() -> Vec<PatchField> {
    PatchField::ALL.to_vec()
}

/// What to do with the remaining commands after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPolicy {
    /// Attempt every command in order
    #[default]
    Continue,
    /// Stop at the first failure
    Abort,
}

/// Command execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    #[serde(default)]
    pub policy: ExecutionPolicy,
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            policy: ExecutionPolicy::default(),
            kubectl_path: default_kubectl_path(),
        }
    }
}

fn default_kubectl_path() -> String {
    "kubectl".to_string()
}

/// How incidents are verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Query Alertmanager for the alert directly
    #[default]
    Alertmanager,
    /// Invoke a remote verification agent
    Http,
}

/// Collaborator endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorConfig {
    #[serde(default)]
    pub diagnosis_url: Option<String>,
    #[serde(default)]
    pub report_url: Option<String>,
    #[serde(default)]
    pub verification: VerificationMode,
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(default = "default_alertmanager_url")]
    pub alertmanager_url: String,
    /// Wait before checking whether the alert cleared
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    /// Retries for verification and reporting
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            diagnosis_url: None,
            report_url: None,
            verification: VerificationMode::default(),
            verification_url: None,
            alertmanager_url: default_alertmanager_url(),
            settle_delay_secs: default_settle_delay_secs(),
            retries: default_retries(),
        }
    }
}

impl CollaboratorConfig {
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

fn default_alertmanager_url() -> String {
    "http://alertmanager-operated.monitoring.svc.cluster.local:9093".to_string()
}

fn default_settle_delay_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    2
}

/// Context store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Context store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("/var/lib/remediator/sessions")
}

/// Alert ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    /// Namespace used when an alert has no `namespace` label
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    #[serde(default = "default_dedup_retention_hours")]
    pub dedup_retention_hours: u64,
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            dedup_retention_hours: default_dedup_retention_hours(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_dedup_retention_hours() -> u64 {
    24
}

fn default_max_concurrent_sessions() -> usize {
    5
}
