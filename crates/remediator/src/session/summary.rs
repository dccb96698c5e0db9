//! Plain-text failure summaries.

use handlebars::Handlebars;
use serde::Serialize;
use tracing::warn;

use super::types::FailureKind;
use super::Phase;

const FAILURE_TEMPLATE: &str = "\
Remediation session {{session_id}} for alert {{alert_name}} failed.
Failure kind: {{kind}}
Failed during: {{failed_from}} (furthest phase reached: {{furthest_phase}})
Cause: {{cause}}
{{#if executed}}Commands executed:
{{#each executed}}  - {{this}}
{{/each}}{{else}}No commands were executed.
{{/if}}";

/// Values available to the failure template.
#[derive(Debug, Serialize)]
pub struct FailureSummaryData<'a> {
    pub session_id: &'a str,
    pub alert_name: &'a str,
    pub kind: FailureKind,
    pub failed_from: Phase,
    pub furthest_phase: Phase,
    pub cause: &'a str,
    /// Command lines with their result
    pub executed: Vec<String>,
}

/// Render the failure summary.
///
/// Rendering cannot fail the session: on a template error a one-line
/// summary is returned instead.
#[must_use]
pub fn render_failure_summary(data: &FailureSummaryData<'_>) -> String {
    let mut templates = Handlebars::new();
    templates.set_strict_mode(true);
    templates.register_escape_fn(handlebars::no_escape);

    match templates.render_template(FAILURE_TEMPLATE, data) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to render failure summary");
            format!(
                "Remediation session {} for alert {} failed ({}) during {}: {}",
                data.session_id, data.alert_name, data.kind, data.failed_from, data.cause
            )
        }
    }
}
