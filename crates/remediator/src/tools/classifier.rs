//! Error classification for control-plane command output.
//!
//! Maps a raw command outcome (exit status, stderr text) onto the closed
//! [`ErrorKind`] taxonomy. The API server's status reason
//! (`Error from server (NotFound): ...`) decides when present; otherwise
//! ordered, case-insensitive pattern rules run over the text with quoted
//! resource names blanked out. Anything unmatched is [`ErrorKind::Unknown`];
//! the raw text is never discarded by callers.

use regex::Regex;
use std::sync::LazyLock;

use super::result::ErrorKind;

/// Exit status used by `timeout(1)` and by kubectl's `--request-timeout`.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Status reason printed by kubectl for API server errors.
static SERVER_REASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Error from server \((\w+)\)").unwrap());

/// Double-quoted segments, which carry resource names.
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[^"]*""#).unwrap());

/// Quota and admission rejections arrive as Forbidden.
static POLICY_REJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)exceeded quota|quota exceeded|limit ?range|admission webhook").unwrap()
});

/// Ordered classification rules. The first matching kind wins.
static RULES: LazyLock<Vec<(ErrorKind, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            ErrorKind::Conflict,
            vec![
                Regex::new(r"(?i)\(conflict\)").unwrap(),
                Regex::new(r"(?i)the object has been modified").unwrap(),
                Regex::new(r"(?i)apply your changes to the latest version").unwrap(),
                Regex::new(r"(?i)\balready exists\b").unwrap(),
                Regex::new(r"(?i)\bconflict\b").unwrap(),
            ],
        ),
        (
            // Admission and quota rejections come back as Forbidden, but the
            // request itself is what needs changing.
            ErrorKind::InvalidInput,
            vec![
                Regex::new(r"(?i)exceeded quota|quota exceeded").unwrap(),
                Regex::new(r"(?i)limit ?range").unwrap(),
                Regex::new(r"(?i)admission webhook").unwrap(),
                Regex::new(r"(?i)\(invalid\)|\(badrequest\)").unwrap(),
                Regex::new(r"(?i)\binvalid\b").unwrap(),
                Regex::new(r"(?i)unknown (command|flag|shorthand flag)").unwrap(),
                Regex::new(r"(?i)malformed").unwrap(),
                Regex::new(r"(?i)error (parsing|validating)|unable to parse").unwrap(),
                Regex::new(r"(?i)cannot unmarshal").unwrap(),
            ],
        ),
        (
            ErrorKind::PermissionDenied,
            vec![
                Regex::new(r"(?i)forbidden").unwrap(),
                Regex::new(r"(?i)unauthorized").unwrap(),
                Regex::new(r"(?i)permission denied").unwrap(),
                Regex::new(r"(?i)authentication required|must be logged in").unwrap(),
            ],
        ),
        (
            ErrorKind::NotFound,
            vec![
                Regex::new(r"(?i)\(notfound\)").unwrap(),
                Regex::new(r"(?i)not found").unwrap(),
                Regex::new(r"(?i)no resources found").unwrap(),
                Regex::new(r"(?i)doesn't have a resource type").unwrap(),
                Regex::new(r"(?i)no such (file|host|resource)").unwrap(),
            ],
        ),
        (
            ErrorKind::Timeout,
            vec![
                Regex::new(r"(?i)timed out").unwrap(),
                Regex::new(r"(?i)\btimeout\b").unwrap(),
                Regex::new(r"(?i)deadline exceeded").unwrap(),
            ],
        ),
    ]
});

/// Classify a failed command outcome.
///
/// `exit_code` is `None` when the process was terminated by a signal.
#[must_use]
pub fn classify(exit_code: Option<i32>, stderr: &str) -> ErrorKind {
    if exit_code == Some(TIMEOUT_EXIT_CODE) {
        return ErrorKind::Timeout;
    }

    let text = QUOTED.replace_all(stderr, "\"\"");
    if let Some(kind) = SERVER_REASON
        .captures(&text)
        .and_then(|caps| reason_kind(&caps[1], &text))
    {
        return kind;
    }

    for (kind, patterns) in RULES.iter() {
        if patterns.iter().any(|p| p.is_match(&text)) {
            return *kind;
        }
    }

    ErrorKind::Unknown
}

fn reason_kind(reason: &str, text: &str) -> Option<ErrorKind> {
    let kind = match reason {
        "NotFound" => ErrorKind::NotFound,
        "Forbidden" if POLICY_REJECTION.is_match(text) => ErrorKind::InvalidInput,
        "Forbidden" | "Unauthorized" => ErrorKind::PermissionDenied,
        "Conflict" | "AlreadyExists" => ErrorKind::Conflict,
        "Invalid" | "BadRequest" => ErrorKind::InvalidInput,
        "Timeout" | "ServerTimeout" => ErrorKind::Timeout,
        _ => return None,
    };
    Some(kind)
}

/// Suggested next action for an error kind.
///
/// Namespace and resource are woven into the hint when known.
#[must_use]
pub fn suggestion(kind: ErrorKind, namespace: Option<&str>, resource: Option<&str>) -> String {
    let resource = resource.unwrap_or("the resource");
    match kind {
        ErrorKind::NotFound => match namespace {
            Some(ns) => format!(
                "Verify that {resource} exists in namespace '{ns}' and that the name is spelled correctly"
            ),
            None => format!("Verify that {resource} exists and that the name is spelled correctly"),
        },
        ErrorKind::PermissionDenied => match namespace {
            Some(ns) => format!(
                "Check that the service account has permission to act on {resource} in namespace '{ns}'"
            ),
            None => format!("Check that the service account has permission to act on {resource}"),
        },
        ErrorKind::Timeout => {
            "Check control plane responsiveness; read operations may be retried, remediation actions must be re-planned"
                .to_string()
        }
        ErrorKind::InvalidInput => {
            "Review the command parameters against quota, limit range and field constraints".to_string()
        }
        ErrorKind::Conflict => format!(
            "{resource} was modified concurrently; re-read its current state before planning another change"
        ),
        ErrorKind::Unknown => {
            "Check command logs and cluster status for more detail".to_string()
        }
    }
}
