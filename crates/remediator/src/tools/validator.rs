//! Command validation.
//!
//! The validator is the only producer of [`ValidatedCommand`]. It is a pure
//! function of its configuration and the proposal: no I/O, no clock, no
//! state, so identical input always yields an identical decision.
//!
//! Checks run in a fixed order and stop at the first broken rule:
//! shell metacharacters, verb allowlist, target format, forbidden kinds,
//! kind allowlist, name format, verb/kind applicability, then per-verb
//! parameters.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use super::command::{
    CommandAction, PatchField, PatchValue, ProposedCommand, ResourceKind, ResourceRef,
    ResourceSettings, ValidatedCommand, Verb,
};
use super::plan::{ProposedPlan, RemediationPlan};
use super::result::{ToolError, ToolResult};
use crate::config::ValidatorConfig;

/// Characters that never appear in a legitimate verb, name or parameter.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']', '\\', '\'', '"', '!', '*',
    '?', '~', '#', '^',
];

/// Kinds that are cluster-scoped or affect access control. Never accepted,
/// whatever the configured allowlist says.
const FORBIDDEN_KINDS: &[&str] = &[
    "namespace",
    "namespaces",
    "ns",
    "node",
    "nodes",
    "no",
    "clusterrole",
    "clusterroles",
    "clusterrolebinding",
    "clusterrolebindings",
    "role",
    "roles",
    "rolebinding",
    "rolebindings",
    "serviceaccount",
    "serviceaccounts",
    "sa",
    "persistentvolume",
    "persistentvolumes",
    "pv",
    "customresourcedefinition",
    "customresourcedefinitions",
    "crd",
    "crds",
    "secret",
    "secrets",
    "mutatingwebhookconfiguration",
    "validatingwebhookconfiguration",
    "podsecuritypolicy",
    "storageclass",
    "priorityclass",
];

/// RFC 1123 subdomain (resource names).
static SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// RFC 1123 label (namespaces, container names).
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

static CPU_QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+m|[0-9]+(\.[0-9]{1,3})?)$").unwrap());

static MEMORY_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$").unwrap()
});

/// Named validation rules. A rejection always names exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationRule {
    ShellMetacharacter,
    VerbNotAllowed,
    MalformedTarget,
    ForbiddenResourceKind,
    ResourceKindNotAllowed,
    InvalidName,
    VerbNotApplicable,
    MissingParameter,
    UnknownParameter,
    InvalidNumber,
    InvalidQuantity,
    PatchFieldNotAllowed,
}

impl ValidationRule {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShellMetacharacter => "shell-metacharacter",
            Self::VerbNotAllowed => "verb-not-allowed",
            Self::MalformedTarget => "malformed-target",
            Self::ForbiddenResourceKind => "forbidden-resource-kind",
            Self::ResourceKindNotAllowed => "resource-kind-not-allowed",
            Self::InvalidName => "invalid-name",
            Self::VerbNotApplicable => "verb-not-applicable",
            Self::MissingParameter => "missing-parameter",
            Self::UnknownParameter => "unknown-parameter",
            Self::InvalidNumber => "invalid-number",
            Self::InvalidQuantity => "invalid-quantity",
            Self::PatchFieldNotAllowed => "patch-field-not-allowed",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broken rule with detail.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Violation {
    rule: ValidationRule,
    detail: String,
}

impl Violation {
    fn new(rule: ValidationRule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }

    fn into_tool_error(self, command: &ProposedCommand) -> ToolError {
        ToolError::invalid_input(format!("{}: {}", self.rule, self.detail))
            .with_raw(command.to_string())
            .with_suggestion(format!(
                "Revise the command so it satisfies rule '{}'; only allowlisted verbs and kinds with typed parameters are executed",
                self.rule
            ))
    }
}

/// Verdict for one proposed command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandVerdict {
    pub index: usize,
    pub command: ProposedCommand,
    pub result: ToolResult<ValidatedCommand>,
}

/// Why a whole plan was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum PlanRejection {
    /// The plan has no commands
    EmptyPlan,
    /// At least one command failed validation
    RejectedCommands { indices: Vec<usize> },
    /// Every command is read-only, so executing it cannot remediate anything
    ReadOnlyPlan,
}

impl fmt::Display for PlanRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPlan => f.write_str("plan contains no commands"),
            Self::RejectedCommands { indices } => {
                let list: Vec<String> = indices.iter().map(ToString::to_string).collect();
                write!(f, "commands rejected by validator at index {}", list.join(", "))
            }
            Self::ReadOnlyPlan => f.write_str("plan cannot remediate: every command is read-only"),
        }
    }
}

/// Outcome of validating a whole plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanValidation {
    pub accepted: bool,
    pub verdicts: Vec<CommandVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PlanRejection>,
    #[serde(skip)]
    plan: Option<RemediationPlan>,
}

impl PlanValidation {
    /// The accepted plan, if every check passed.
    #[must_use]
    pub fn plan(&self) -> Option<&RemediationPlan> {
        self.plan.as_ref()
    }

    /// Split into the accepted plan or the rejection.
    pub fn into_plan(self) -> Result<RemediationPlan, PlanRejection> {
        match (self.plan, self.rejection) {
            (Some(plan), None) => Ok(plan),
            (_, Some(rejection)) => Err(rejection),
            (None, None) => Err(PlanRejection::EmptyPlan),
        }
    }
}

/// Allowlist-based command validator.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    allowed_verbs: BTreeSet<Verb>,
    allowed_kinds: BTreeSet<ResourceKind>,
    patch_fields: BTreeSet<PatchField>,
    max_replicas: u32,
    allow_read_only_plans: bool,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default())
    }
}

impl CommandValidator {
    /// Create a validator from configuration.
    #[must_use]
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            allowed_verbs: config.allowed_verbs.iter().copied().collect(),
            allowed_kinds: config.allowed_kinds.iter().copied().collect(),
            patch_fields: config.patch_fields.iter().copied().collect(),
            max_replicas: config.max_replicas,
            allow_read_only_plans: config.allow_read_only_plans,
        }
    }

    /// Validate one proposed command.
    ///
    /// `default_namespace` applies when the proposal names none.
    #[must_use]
    pub fn validate(
        &self,
        command: &ProposedCommand,
        default_namespace: &str,
    ) -> ToolResult<ValidatedCommand> {
        self.check(command, default_namespace)
            .map_err(|violation| violation.into_tool_error(command))
            .into()
    }

    /// Validate every command of a plan. The plan is accepted only if all
    /// commands pass; every command gets a verdict either way.
    #[must_use]
    pub fn validate_plan(&self, plan: &ProposedPlan, default_namespace: &str) -> PlanValidation {
        let verdicts: Vec<CommandVerdict> = plan
            .commands
            .iter()
            .enumerate()
            .map(|(index, command)| CommandVerdict {
                index,
                command: command.clone(),
                result: self.validate(command, default_namespace),
            })
            .collect();

        let rejected: Vec<usize> = verdicts
            .iter()
            .filter(|v| !v.result.is_success())
            .map(|v| v.index)
            .collect();

        let rejection = if verdicts.is_empty() {
            Some(PlanRejection::EmptyPlan)
        } else if !rejected.is_empty() {
            Some(PlanRejection::RejectedCommands { indices: rejected })
        } else if !self.allow_read_only_plans
            && verdicts
                .iter()
                .filter_map(|v| v.result.data())
                .all(|c| !c.is_mutating())
        {
            Some(PlanRejection::ReadOnlyPlan)
        } else {
            None
        };

        let plan = if rejection.is_none() {
            let commands = verdicts
                .iter()
                .filter_map(|v| v.result.data().cloned())
                .collect();
            Some(RemediationPlan::new(plan.rationale.clone(), commands))
        } else {
            None
        };

        PlanValidation {
            accepted: plan.is_some(),
            verdicts,
            rejection,
            plan,
        }
    }

    fn check(
        &self,
        command: &ProposedCommand,
        default_namespace: &str,
    ) -> Result<ValidatedCommand, Violation> {
        check_metacharacters(command)?;

        let verb: Verb = command
            .verb
            .trim()
            .parse()
            .ok()
            .filter(|v| self.allowed_verbs.contains(v))
            .ok_or_else(|| {
                Violation::new(
                    ValidationRule::VerbNotAllowed,
                    format!("verb '{}' is not in the allowlist", command.verb),
                )
            })?;

        let (kind_text, name) = command.target.split_once('/').ok_or_else(|| {
            Violation::new(
                ValidationRule::MalformedTarget,
                format!("target '{}' is not of the form kind/name", command.target),
            )
        })?;
        if name.contains('/') || kind_text.is_empty() || name.is_empty() {
            return Err(Violation::new(
                ValidationRule::MalformedTarget,
                format!("target '{}' is not of the form kind/name", command.target),
            ));
        }

        let kind_lower = kind_text.to_ascii_lowercase();
        let kind_base = kind_lower.split('.').next().unwrap_or_default();
        if FORBIDDEN_KINDS.contains(&kind_base) {
            return Err(Violation::new(
                ValidationRule::ForbiddenResourceKind,
                format!("kind '{kind_text}' is cluster-scoped or affects access control"),
            ));
        }
        let kind = ResourceKind::parse(kind_text)
            .filter(|k| self.allowed_kinds.contains(k))
            .ok_or_else(|| {
                Violation::new(
                    ValidationRule::ResourceKindNotAllowed,
                    format!("kind '{kind_text}' is not in the allowlist"),
                )
            })?;

        if name.len() > 253 || !SUBDOMAIN.is_match(name) {
            return Err(Violation::new(
                ValidationRule::InvalidName,
                format!("resource name '{name}' is not a valid RFC 1123 name"),
            ));
        }

        let namespace = command
            .namespace
            .as_deref()
            .unwrap_or(default_namespace)
            .to_string();
        if !is_label(&namespace) {
            return Err(Violation::new(
                ValidationRule::InvalidName,
                format!("namespace '{namespace}' is not a valid RFC 1123 label"),
            ));
        }

        if !verb.applies_to(kind) {
            return Err(Violation::new(
                ValidationRule::VerbNotApplicable,
                format!("verb '{verb}' cannot be applied to kind '{kind}'"),
            ));
        }

        let action = self.parse_action(verb, &command.params)?;
        let target = ResourceRef {
            kind,
            name: name.to_string(),
            namespace,
        };
        Ok(ValidatedCommand::new(target, action))
    }

    fn parse_action(
        &self,
        verb: Verb,
        params: &BTreeMap<String, String>,
    ) -> Result<CommandAction, Violation> {
        match verb {
            Verb::Get => no_params(verb, params).map(|()| CommandAction::Get),
            Verb::Describe => no_params(verb, params).map(|()| CommandAction::Describe),
            Verb::RolloutRestart => no_params(verb, params).map(|()| CommandAction::RolloutRestart),
            Verb::Logs => {
                only_params(verb, params, &["tail"])?;
                let tail = params
                    .get("tail")
                    .map(|v| parse_count("tail", v, None))
                    .transpose()?;
                Ok(CommandAction::Logs { tail })
            }
            Verb::Scale => {
                only_params(verb, params, &["replicas"])?;
                let raw = params.get("replicas").ok_or_else(|| {
                    Violation::new(
                        ValidationRule::MissingParameter,
                        "scale requires parameter 'replicas'",
                    )
                })?;
                let replicas = parse_count("replicas", raw, Some(self.max_replicas))?;
                Ok(CommandAction::Scale { replicas })
            }
            Verb::SetResources => {
                only_params(
                    verb,
                    params,
                    &["cpu", "memory", "request-cpu", "request-memory", "container"],
                )?;
                let settings = ResourceSettings {
                    container: params
                        .get("container")
                        .map(|c| {
                            if is_label(c) {
                                Ok(c.clone())
                            } else {
                                Err(Violation::new(
                                    ValidationRule::InvalidName,
                                    format!("container '{c}' is not a valid RFC 1123 label"),
                                ))
                            }
                        })
                        .transpose()?,
                    limit_cpu: quantity(params, "cpu", &CPU_QUANTITY)?,
                    limit_memory: quantity(params, "memory", &MEMORY_QUANTITY)?,
                    request_cpu: quantity(params, "request-cpu", &CPU_QUANTITY)?,
                    request_memory: quantity(params, "request-memory", &MEMORY_QUANTITY)?,
                };
                if settings.limit_cpu.is_none()
                    && settings.limit_memory.is_none()
                    && settings.request_cpu.is_none()
                    && settings.request_memory.is_none()
                {
                    return Err(Violation::new(
                        ValidationRule::MissingParameter,
                        "set-resources requires at least one of cpu, memory, request-cpu, request-memory",
                    ));
                }
                Ok(CommandAction::SetResources(settings))
            }
            Verb::Patch => {
                if params.is_empty() {
                    return Err(Violation::new(
                        ValidationRule::MissingParameter,
                        "patch requires at least one field",
                    ));
                }
                let mut fields = BTreeMap::new();
                for (path, raw) in params {
                    let field = PatchField::parse(path)
                        .filter(|f| self.patch_fields.contains(f))
                        .ok_or_else(|| {
                            Violation::new(
                                ValidationRule::PatchFieldNotAllowed,
                                format!("field '{path}' may not be patched"),
                            )
                        })?;
                    let value = match field {
                        PatchField::Paused => PatchValue::Bool(parse_bool(path, raw)?),
                        PatchField::Replicas => {
                            PatchValue::Integer(parse_count(path, raw, Some(self.max_replicas))?)
                        }
                        PatchField::MinReadySeconds
                        | PatchField::ProgressDeadlineSeconds
                        | PatchField::RevisionHistoryLimit => {
                            PatchValue::Integer(parse_count(path, raw, None)?)
                        }
                    };
                    fields.insert(field, value);
                }
                Ok(CommandAction::Patch { fields })
            }
        }
    }
}

fn check_metacharacters(command: &ProposedCommand) -> Result<(), Violation> {
    let namespace = command.namespace.iter().map(String::as_str);
    let params = command
        .params
        .iter()
        .flat_map(|(k, v)| [k.as_str(), v.as_str()]);
    let fields = [command.verb.as_str(), command.target.as_str()]
        .into_iter()
        .chain(namespace)
        .chain(params);

    for field in fields {
        if let Some(c) = field
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || SHELL_METACHARACTERS.contains(c))
        {
            return Err(Violation::new(
                ValidationRule::ShellMetacharacter,
                format!("'{}' contains forbidden character {c:?}", field.trim()),
            ));
        }
    }
    Ok(())
}

fn is_label(value: &str) -> bool {
    value.len() <= 63 && LABEL.is_match(value)
}

fn no_params(verb: Verb, params: &BTreeMap<String, String>) -> Result<(), Violation> {
    only_params(verb, params, &[])
}

fn only_params(
    verb: Verb,
    params: &BTreeMap<String, String>,
    allowed: &[&str],
) -> Result<(), Violation> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(Violation::new(
            ValidationRule::UnknownParameter,
            format!("parameter '{key}' is not accepted by verb '{verb}'"),
        )),
        None => Ok(()),
    }
}

fn parse_count(name: &str, raw: &str, max: Option<u32>) -> Result<u32, Violation> {
    let value: u32 = raw.parse().map_err(|_| {
        Violation::new(
            ValidationRule::InvalidNumber,
            format!("'{name}' must be a non-negative integer, got '{raw}'"),
        )
    })?;
    if let Some(max) = max {
        if value > max {
            return Err(Violation::new(
                ValidationRule::InvalidNumber,
                format!("'{name}' = {value} exceeds the maximum of {max}"),
            ));
        }
    }
    Ok(value)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, Violation> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Violation::new(
            ValidationRule::InvalidNumber,
            format!("'{name}' must be true or false, got '{raw}'"),
        )),
    }
}

fn quantity(
    params: &BTreeMap<String, String>,
    key: &str,
    pattern: &Regex,
) -> Result<Option<String>, Violation> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) if pattern.is_match(raw) => Ok(Some(raw.clone())),
        Some(raw) => Err(Violation::new(
            ValidationRule::InvalidQuantity,
            format!("'{key}' value '{raw}' is not a valid resource quantity"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::result::ErrorKind;

    fn validator() -> CommandValidator {
        CommandValidator::default()
    }

    fn rejection_message(cmd: &ProposedCommand) -> String {
        let result = validator().validate(cmd, "prod");
        let error = result.error().expect("expected rejection");
        assert_eq!(error.kind, ErrorKind::InvalidInput);
        error.message.clone()
    }

    #[test]
    fn test_accepts_set_resources() {
        let cmd = ProposedCommand::new("set-resources", "deployment/svc-b").param("cpu", "500m");
        let result = validator().validate(&cmd, "prod");
        let validated = result.data().expect("accepted");
        assert_eq!(validated.target().namespace, "prod");
        assert_eq!(validated.verb(), Verb::SetResources);
        assert!(validated.is_mutating());
    }

    #[test]
    fn test_rejects_disallowed_verb() {
        let msg = rejection_message(&ProposedCommand::new("delete", "deployment/svc-b"));
        assert!(msg.starts_with("verb-not-allowed"), "{msg}");
    }

    #[test]
    fn test_rejects_forbidden_kind_even_if_verb_allowed() {
        for target in ["namespace/prod", "clusterrole/admin", "node/worker-1", "crd/foo"] {
            let msg = rejection_message(&ProposedCommand::new("get", target));
            assert!(msg.starts_with("forbidden-resource-kind"), "{target}: {msg}");
        }
    }

    #[test]
    fn test_rejects_kind_outside_allowlist() {
        // statefulset is supported but not in the default allowlist
        let msg = rejection_message(&ProposedCommand::new("rollout-restart", "statefulset/db"));
        assert!(msg.starts_with("resource-kind-not-allowed"), "{msg}");

        let config = ValidatorConfig {
            allowed_kinds: vec![ResourceKind::StatefulSet],
            ..ValidatorConfig::default()
        };
        let cmd = ProposedCommand::new("rollout-restart", "statefulset/db");
        assert!(CommandValidator::new(&config).validate(&cmd, "prod").is_success());
    }

    #[test]
    fn test_rejects_shell_metacharacters() {
        let cases = [
            ProposedCommand::new("get", "pod/web;rm -rf /"),
            ProposedCommand::new("get", "pod/web").in_namespace("prod && curl evil"),
            ProposedCommand::new("scale", "deployment/web").param("replicas", "$(id)"),
            ProposedCommand::new("get", "pod/web|sh"),
            ProposedCommand::new("get pods", "pod/web"),
        ];
        for cmd in cases {
            let msg = rejection_message(&cmd);
            assert!(msg.starts_with("shell-metacharacter"), "{cmd}: {msg}");
        }
    }

    #[test]
    fn test_rejects_malformed_target_and_names() {
        assert!(rejection_message(&ProposedCommand::new("get", "deployment"))
            .starts_with("malformed-target"));
        assert!(rejection_message(&ProposedCommand::new("get", "deployment/a/b"))
            .starts_with("malformed-target"));
        assert!(rejection_message(&ProposedCommand::new("get", "deployment/Web_App"))
            .starts_with("invalid-name"));
        assert!(rejection_message(&ProposedCommand::new("get", "deployment/-n"))
            .starts_with("invalid-name"));
        assert!(
            rejection_message(&ProposedCommand::new("get", "pod/web").in_namespace("Prod"))
                .starts_with("invalid-name")
        );
    }

    #[test]
    fn test_scale_replica_bounds() {
        let ok = ProposedCommand::new("scale", "deployment/web").param("replicas", "20");
        assert!(validator().validate(&ok, "prod").is_success());

        let too_many = ProposedCommand::new("scale", "deployment/web").param("replicas", "21");
        assert!(rejection_message(&too_many).starts_with("invalid-number"));

        let negative = ProposedCommand::new("scale", "deployment/web").param("replicas", "-1");
        assert!(rejection_message(&negative).starts_with("invalid-number"));

        let missing = ProposedCommand::new("scale", "deployment/web");
        assert!(rejection_message(&missing).starts_with("missing-parameter"));
    }

    #[test]
    fn test_set_resources_quantities() {
        let ok = ProposedCommand::new("set-resources", "deployment/web")
            .param("memory", "512Mi")
            .param("request-cpu", "0.25")
            .param("container", "app");
        assert!(validator().validate(&ok, "prod").is_success());

        let bad = ProposedCommand::new("set-resources", "deployment/web").param("cpu", "lots");
        assert!(rejection_message(&bad).starts_with("invalid-quantity"));

        let unknown = ProposedCommand::new("set-resources", "deployment/web")
            .param("cpu", "1")
            .param("privileged", "true");
        assert!(rejection_message(&unknown).starts_with("unknown-parameter"));

        let empty = ProposedCommand::new("set-resources", "deployment/web");
        assert!(rejection_message(&empty).starts_with("missing-parameter"));
    }

    #[test]
    fn test_patch_fields() {
        let ok = ProposedCommand::new("patch", "deployment/web")
            .param("spec.replicas", "4")
            .param("spec.paused", "false");
        let result = validator().validate(&ok, "prod");
        let CommandAction::Patch { fields } = result.data().expect("accepted").action() else {
            panic!("expected patch action");
        };
        assert_eq!(fields.get(&PatchField::Replicas), Some(&PatchValue::Integer(4)));

        let forbidden = ProposedCommand::new("patch", "deployment/web")
            .param("spec.template.spec.containers", "x");
        assert!(rejection_message(&forbidden).starts_with("patch-field-not-allowed"));

        let bad_bool = ProposedCommand::new("patch", "deployment/web").param("spec.paused", "yes");
        assert!(rejection_message(&bad_bool).starts_with("invalid-number"));
    }

    #[test]
    fn test_verb_not_applicable() {
        let msg = rejection_message(&ProposedCommand::new("rollout-restart", "pod/web-123"));
        assert!(msg.starts_with("verb-not-applicable"), "{msg}");
        let msg = rejection_message(&ProposedCommand::new("logs", "deployment/web"));
        assert!(msg.starts_with("verb-not-applicable"), "{msg}");
    }

    #[test]
    fn test_validation_is_deterministic() {
        let cmd = ProposedCommand::new("scale", "deployment/web").param("replicas", "3");
        let v = validator();
        let first = v.validate(&cmd, "prod");
        for _ in 0..10 {
            assert_eq!(v.validate(&cmd, "prod"), first);
        }
        let bad = ProposedCommand::new("delete", "namespace/prod");
        let first = v.validate(&bad, "prod");
        assert_eq!(v.validate(&bad, "prod"), first);
    }

    #[test]
    fn test_plan_rejected_in_full() {
        let plan = ProposedPlan {
            rationale: "cleanup".into(),
            commands: vec![
                ProposedCommand::new("scale", "deployment/web").param("replicas", "2"),
                ProposedCommand::new("delete", "namespace/prod"),
            ],
        };
        let validation = validator().validate_plan(&plan, "prod");
        assert!(!validation.accepted);
        assert!(validation.plan().is_none());
        assert_eq!(validation.verdicts.len(), 2);
        assert!(validation.verdicts[0].result.is_success());
        assert_eq!(
            validation.rejection,
            Some(PlanRejection::RejectedCommands { indices: vec![1] })
        );
    }

    #[test]
    fn test_read_only_plan_rejected_unless_configured() {
        let plan = ProposedPlan {
            rationale: "look around".into(),
            commands: vec![
                ProposedCommand::new("get", "deployment/web"),
                ProposedCommand::new("logs", "pod/web-1").param("tail", "100"),
            ],
        };
        let validation = validator().validate_plan(&plan, "prod");
        assert_eq!(validation.rejection, Some(PlanRejection::ReadOnlyPlan));

        let lenient = CommandValidator::new(&ValidatorConfig {
            allow_read_only_plans: true,
            ..ValidatorConfig::default()
        });
        let plan = lenient.validate_plan(&plan, "prod").into_plan().unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_empty_plan_rejected() {
        let validation = validator().validate_plan(&ProposedPlan::default(), "prod");
        assert_eq!(validation.into_plan(), Err(PlanRejection::EmptyPlan));
    }

    #[test]
    fn test_plan_validation_serializes_verdicts() {
        let plan = ProposedPlan {
            rationale: String::new(),
            commands: vec![ProposedCommand::new("exec", "pod/web")],
        };
        let value = serde_json::to_value(validator().validate_plan(&plan, "prod")).unwrap();
        assert_eq!(value["accepted"], serde_json::json!(false));
        assert_eq!(value["rejection"]["reason"], serde_json::json!("rejected-commands"));
        assert_eq!(value["verdicts"][0]["result"]["success"], serde_json::json!(false));
        assert_eq!(
            value["verdicts"][0]["result"]["error"]["kind"],
            serde_json::json!("invalid-input")
        );
    }
}
