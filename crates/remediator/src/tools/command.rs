//! Command representation.
//!
//! A remediation step arrives from the diagnosis collaborator as a loosely
//! typed [`ProposedCommand`]. The validator parses it into a closed
//! [`ValidatedCommand`]: typed verb, typed resource kind, typed parameters.
//! `ValidatedCommand` has no public constructor and no `Deserialize` impl, so
//! the only way to obtain one is through
//! [`CommandValidator`](super::validator::CommandValidator).
//! Executor argv is rendered from the typed form, never from proposal text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Remediation command as proposed by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedCommand {
    /// Verb, e.g. `scale`, `set-resources`
    pub verb: String,
    /// Target in `kind/name` form, e.g. `deployment/svc-b`
    pub target: String,
    /// Namespace; falls back to the incident's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Verb parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ProposedCommand {
    /// Create a proposal without parameters.
    pub fn new(verb: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            target: target.into(),
            namespace: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ProposedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.target)?;
        if let Some(ns) = &self.namespace {
            write!(f, " -n {ns}")?;
        }
        for (k, v) in &self.params {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// Known command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    Get,
    Describe,
    Logs,
    Scale,
    SetResources,
    RolloutRestart,
    Patch,
}

impl Verb {
    /// Every known verb.
    pub const ALL: [Verb; 7] = [
        Self::Get,
        Self::Describe,
        Self::Logs,
        Self::Scale,
        Self::SetResources,
        Self::RolloutRestart,
        Self::Patch,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Describe => "describe",
            Self::Logs => "logs",
            Self::Scale => "scale",
            Self::SetResources => "set-resources",
            Self::RolloutRestart => "rollout-restart",
            Self::Patch => "patch",
        }
    }

    /// Whether the verb changes cluster state.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Get | Self::Describe | Self::Logs)
    }

    /// Resource kinds this verb can act on.
    #[must_use]
    pub fn applies_to(self, kind: ResourceKind) -> bool {
        match self {
            Self::Get | Self::Describe => true,
            Self::Logs => kind == ResourceKind::Pod,
            Self::Scale | Self::RolloutRestart | Self::Patch | Self::SetResources => {
                kind != ResourceKind::Pod
            }
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Namespaced workload kinds commands may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
    Pod,
}

impl ResourceKind {
    /// Canonical kubectl resource name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
            Self::Pod => "pod",
        }
    }

    /// Parse a kind, accepting kubectl's plural and short forms.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" | "deployments" | "deploy" | "deployment.apps" => Some(Self::Deployment),
            "statefulset" | "statefulsets" | "sts" | "statefulset.apps" => Some(Self::StatefulSet),
            "pod" | "pods" | "po" => Some(Self::Pod),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A namespaced resource reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Field paths a `patch` command may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatchField {
    #[serde(rename = "spec.replicas")]
    Replicas,
    #[serde(rename = "spec.minReadySeconds")]
    MinReadySeconds,
    #[serde(rename = "spec.progressDeadlineSeconds")]
    ProgressDeadlineSeconds,
    #[serde(rename = "spec.revisionHistoryLimit")]
    RevisionHistoryLimit,
    #[serde(rename = "spec.paused")]
    Paused,
}

impl PatchField {
    /// Every supported field.
    pub const ALL: [PatchField; 5] = [
        Self::Replicas,
        Self::MinReadySeconds,
        Self::ProgressDeadlineSeconds,
        Self::RevisionHistoryLimit,
        Self::Paused,
    ];

    /// Dotted field path.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Replicas => "spec.replicas",
            Self::MinReadySeconds => "spec.minReadySeconds",
            Self::ProgressDeadlineSeconds => "spec.progressDeadlineSeconds",
            Self::RevisionHistoryLimit => "spec.revisionHistoryLimit",
            Self::Paused => "spec.paused",
        }
    }

    /// Key under `spec` in the merge patch document.
    fn spec_key(self) -> &'static str {
        self.path().trim_start_matches("spec.")
    }

    /// Parse a dotted field path.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.path() == path)
    }
}

/// Typed patch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    Integer(u32),
    Bool(bool),
}

/// Container resource settings for `set-resources`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_memory: Option<String>,
}

/// Verb-specific typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verb", rename_all = "kebab-case")]
pub enum CommandAction {
    Get,
    Describe,
    Logs {
        #[serde(skip_serializing_if = "Option::is_none")]
        tail: Option<u32>,
    },
    Scale {
        replicas: u32,
    },
    SetResources(ResourceSettings),
    RolloutRestart,
    Patch {
        fields: BTreeMap<PatchField, PatchValue>,
    },
}

impl CommandAction {
    /// The verb of this action.
    #[must_use]
    pub fn verb(&self) -> Verb {
        match self {
            Self::Get => Verb::Get,
            Self::Describe => Verb::Describe,
            Self::Logs { .. } => Verb::Logs,
            Self::Scale { .. } => Verb::Scale,
            Self::SetResources(_) => Verb::SetResources,
            Self::RolloutRestart => Verb::RolloutRestart,
            Self::Patch { .. } => Verb::Patch,
        }
    }
}

/// A command that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedCommand {
    target: ResourceRef,
    action: CommandAction,
}

impl ValidatedCommand {
    pub(crate) fn new(target: ResourceRef, action: CommandAction) -> Self {
        Self { target, action }
    }

    /// Target resource.
    #[must_use]
    pub fn target(&self) -> &ResourceRef {
        &self.target
    }

    /// Typed action.
    #[must_use]
    pub fn action(&self) -> &CommandAction {
        &self.action
    }

    /// Verb.
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.action.verb()
    }

    /// Whether the command changes cluster state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.verb().is_mutating()
    }

    /// Render kubectl arguments (excluding the program name).
    ///
    /// Every element is a discrete argv entry; nothing is ever passed through
    /// a shell.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let target = self.target.to_string();
        let ns = self.target.namespace.clone();
        let mut args: Vec<String> = match &self.action {
            CommandAction::Get => vec!["get".into(), target, "-o".into(), "json".into()],
            CommandAction::Describe => vec!["describe".into(), target],
            CommandAction::Logs { tail } => {
                let mut args = vec!["logs".to_string(), self.target.name.clone()];
                if let Some(tail) = tail {
                    args.push(format!("--tail={tail}"));
                }
                args
            }
            CommandAction::Scale { replicas } => {
                vec!["scale".into(), target, format!("--replicas={replicas}")]
            }
            CommandAction::SetResources(settings) => {
                let mut args = vec!["set".to_string(), "resources".to_string(), target];
                if let Some(container) = &settings.container {
                    args.push(format!("--containers={container}"));
                }
                let limits = quantity_list(&settings.limit_cpu, &settings.limit_memory);
                if !limits.is_empty() {
                    args.push(format!("--limits={limits}"));
                }
                let requests = quantity_list(&settings.request_cpu, &settings.request_memory);
                if !requests.is_empty() {
                    args.push(format!("--requests={requests}"));
                }
                args
            }
            CommandAction::RolloutRestart => vec!["rollout".into(), "restart".into(), target],
            CommandAction::Patch { fields } => {
                vec![
                    "patch".into(),
                    target,
                    "--type=merge".into(),
                    "-p".into(),
                    merge_patch(fields).to_string(),
                ]
            }
        };
        args.push("-n".into());
        args.push(ns);
        args
    }
}

impl fmt::Display for ValidatedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kubectl {}", self.to_args().join(" "))
    }
}

fn quantity_list(cpu: &Option<String>, memory: &Option<String>) -> String {
    let mut parts = Vec::new();
    if let Some(cpu) = cpu {
        parts.push(format!("cpu={cpu}"));
    }
    if let Some(memory) = memory {
        parts.push(format!("memory={memory}"));
    }
    parts.join(",")
}

fn merge_patch(fields: &BTreeMap<PatchField, PatchValue>) -> serde_json::Value {
    let spec: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(field, value)| {
            let value = match value {
                PatchValue::Integer(n) => serde_json::Value::from(*n),
                PatchValue::Bool(b) => serde_json::Value::from(*b),
            };
            (field.spec_key().to_string(), value)
        })
        .collect();
    serde_json::json!({ "spec": spec })
}
