//! Session state machine.
//!
//! An [`Orchestrator`] owns the shared machinery (context store, registry,
//! validator, executor, collaborators) and opens one [`Session`] per
//! incident. A session advances through its phases strictly in order; each
//! phase method checks the current phase first and returns a
//! [`ProtocolError`] without touching state when invoked out of order or a
//! second time.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::registry::{SessionRegistry, SessionSummary};
use super::summary::{render_failure_summary, FailureSummaryData};
use super::types::{ExecutedCommand, FailureKind, FailureRecord, Incident, Outcome, Report};
use super::Phase;
use crate::collaborators::messages::{
    DiagnosisRequest, DiagnosisResponse, ReportRequest, ReportResponse, VerificationRequest,
    VerificationResponse,
};
use crate::collaborators::{call, Capability, OP_DIAGNOSE, OP_REPORT, OP_VERIFY};
use crate::config::{ExecutionPolicy, RemediatorConfig, TimeoutConfig};
use crate::context::{ContextKey, ContextStore, SessionContext};
use crate::error::{CollaboratorError, ProtocolError, StoreError};
use crate::tools::{
    CommandExecutor, CommandValidator, ExecutionRecord, PlanRejection, RemediationPlan,
};

/// The collaborators a session talks to. `None` means not configured; a
/// session reaching that phase fails with `collaborator-unavailable`.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub diagnosis: Option<Arc<dyn Capability>>,
    pub verification: Option<Arc<dyn Capability>>,
    pub report: Option<Arc<dyn Capability>>,
}

/// Per-session behaviour knobs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timeouts: TimeoutConfig,
    pub policy: ExecutionPolicy,
    /// Retries for verification and reporting
    pub retries: u32,
    /// Base delay between retries, multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            policy: ExecutionPolicy::default(),
            retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &RemediatorConfig) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            policy: config.execution.policy,
            retries: config.collaborators.retries,
            ..Self::default()
        }
    }
}

struct Shared {
    store: Arc<dyn ContextStore>,
    registry: SessionRegistry,
    validator: CommandValidator,
    executor: CommandExecutor,
    collaborators: Collaborators,
    settings: SessionSettings,
}

/// Opens and drives remediation sessions.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ContextStore>,
        registry: SessionRegistry,
        validator: CommandValidator,
        executor: CommandExecutor,
        collaborators: Collaborators,
        settings: SessionSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                registry,
                validator,
                executor,
                collaborators,
                settings,
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn ContextStore> {
        Arc::clone(&self.shared.store)
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.shared.registry
    }

    /// Create a session in `RECEIVED` and persist its incident.
    pub async fn open(&self, incident: Incident) -> Result<Session, ProtocolError> {
        let ctx = SessionContext::new(&incident.id, Arc::clone(&self.shared.store));
        match ctx
            .put(Phase::Received, ContextKey::Incident, &incident)
            .await
        {
            Ok(()) => {}
            Err(StoreError::AlreadyWritten { session_id, .. }) => {
                return Err(ProtocolError::DuplicateSession(session_id))
            }
            Err(e) => return Err(e.into()),
        }
        self.shared
            .registry
            .register(SessionSummary::for_incident(&incident))
            .await?;

        info!(
            session_id = %incident.id,
            alert = %incident.alert_name,
            namespace = %incident.namespace,
            "Session opened"
        );

        Ok(Session {
            shared: Arc::clone(&self.shared),
            ctx,
            incident,
            phase: Phase::Received,
            furthest: Phase::Received,
            diagnosis: None,
            plan: None,
            executions: None,
            verification: None,
            report: None,
            failure: None,
        })
    }

    /// Open a session and drive it to a terminal phase.
    pub async fn remediate(&self, incident: Incident) -> Result<Session, ProtocolError> {
        let mut session = self.open(incident).await?;
        session.drive().await;
        Ok(session)
    }
}

/// One incident's remediation lifecycle.
pub struct Session {
    shared: Arc<Shared>,
    ctx: SessionContext,
    incident: Incident,
    phase: Phase,
    furthest: Phase,
    diagnosis: Option<DiagnosisResponse>,
    plan: Option<RemediationPlan>,
    executions: Option<Vec<ExecutionRecord>>,
    verification: Option<VerificationResponse>,
    report: Option<Report>,
    failure: Option<FailureRecord>,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.incident.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn incident(&self) -> &Incident {
        &self.incident
    }

    #[must_use]
    pub fn plan(&self) -> Option<&RemediationPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub fn executions(&self) -> &[ExecutionRecord] {
        self.executions.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    /// Run the remaining phases until the session is terminal.
    pub async fn drive(&mut self) -> Phase {
        while !self.phase.is_terminal() {
            let step = match self.phase {
                Phase::Received => self.diagnose().await,
                Phase::PlanValidating => self.validate_plan().await,
                Phase::Executing => self.execute().await,
                Phase::Verifying => self.verify().await,
                Phase::Reporting => self.generate_report().await,
                Phase::Diagnosing | Phase::Complete | Phase::Failed => break,
            };
            if let Err(e) = step {
                error!(session_id = %self.incident.id, error = %e, "Session stalled");
                break;
            }
        }
        self.phase
    }

    /// `RECEIVED -> DIAGNOSING -> PLAN_VALIDATING`.
    pub async fn diagnose(&mut self) -> Result<Phase, ProtocolError> {
        self.expect("diagnose", Phase::Received)?;
        self.transition(Phase::Diagnosing).await?;

        let capability = match self.capability(|c| c.diagnosis.as_ref(), "diagnosis") {
            Ok(capability) => capability,
            Err(e) => return Ok(self.fail_collaborator(&e).await),
        };
        let request = DiagnosisRequest::for_incident(&self.incident);
        let response: DiagnosisResponse = match call(
            capability.as_ref(),
            &self.incident.id,
            OP_DIAGNOSE,
            &request,
            self.shared.settings.timeouts.diagnosis(),
        )
        .await
        {
            Ok(response) => response,
            Err(e) => return Ok(self.fail_collaborator(&e).await),
        };

        if let Err(e) = self
            .ctx
            .put(self.phase, ContextKey::Diagnosis, &response)
            .await
        {
            return Ok(self.fail_store(&e).await);
        }

        let incomplete = match &response {
            DiagnosisResponse::CannotDiagnose { reason } => {
                Some(format!("diagnosis collaborator could not diagnose: {reason}"))
            }
            DiagnosisResponse::Plan { commands, .. } if commands.is_empty() => {
                Some("diagnosis proposed a plan without commands".to_string())
            }
            DiagnosisResponse::Plan { .. } => None,
        };
        self.diagnosis = Some(response);

        if let Some(cause) = incomplete {
            return Ok(self.fail(FailureKind::DiagnosisIncomplete, cause).await);
        }
        self.transition(Phase::PlanValidating).await?;
        Ok(self.phase)
    }

    /// `PLAN_VALIDATING -> EXECUTING`, only if every command passes.
    pub async fn validate_plan(&mut self) -> Result<Phase, ProtocolError> {
        self.expect("validate-plan", Phase::PlanValidating)?;

        let proposed = self
            .diagnosis
            .as_ref()
            .and_then(DiagnosisResponse::proposed_plan)
            .unwrap_or_default();
        let validation = self
            .shared
            .validator
            .validate_plan(&proposed, &self.incident.namespace);

        if let Err(e) = self
            .ctx
            .put(self.phase, ContextKey::PlanValidation, &validation)
            .await
        {
            return Ok(self.fail_store(&e).await);
        }

        let reasons: Vec<String> = validation
            .verdicts
            .iter()
            .filter_map(|v| v.result.error().map(|e| format!("#{} {}", v.index, e.message)))
            .collect();

        match validation.into_plan() {
            Ok(plan) => {
                if let Err(e) = self
                    .ctx
                    .put(self.phase, ContextKey::RemediationPlan, &plan)
                    .await
                {
                    return Ok(self.fail_store(&e).await);
                }
                info!(
                    session_id = %self.incident.id,
                    commands = plan.len(),
                    "Remediation plan accepted"
                );
                self.plan = Some(plan);
                self.transition(Phase::Executing).await?;
                Ok(self.phase)
            }
            Err(PlanRejection::EmptyPlan) => Ok(self
                .fail(FailureKind::DiagnosisIncomplete, PlanRejection::EmptyPlan.to_string())
                .await),
            Err(rejection) => {
                let cause = if reasons.is_empty() {
                    rejection.to_string()
                } else {
                    format!("{rejection}: {}", reasons.join("; "))
                };
                Ok(self.fail(FailureKind::UnsafePlan, cause).await)
            }
        }
    }

    /// `EXECUTING -> VERIFYING`. Runs the accepted plan exactly once.
    pub async fn execute(&mut self) -> Result<Phase, ProtocolError> {
        self.expect("execute", Phase::Executing)?;
        let Some(plan) = self.plan.clone() else {
            return Err(ProtocolError::OutOfOrder {
                operation: "execute",
                current: self.phase,
            });
        };

        let records = self
            .shared
            .executor
            .execute_plan(&plan, self.shared.settings.policy)
            .await;

        if let Err(e) = self
            .ctx
            .put(self.phase, ContextKey::ExecutionResults, &records)
            .await
        {
            self.executions = Some(records);
            return Ok(self.fail_store(&e).await);
        }

        let attempted = records.len();
        let failed: Vec<&ExecutionRecord> = records.iter().filter(|r| !r.succeeded()).collect();
        let all_failed = attempted > 0 && failed.len() == attempted;
        let cause = failed
            .first()
            .and_then(|r| r.result.error())
            .map(|e| format!("all {attempted} attempted commands failed; first error: {e}"));
        info!(
            session_id = %self.incident.id,
            attempted,
            failed = failed.len(),
            "Plan executed"
        );
        self.executions = Some(records);

        if all_failed {
            let cause = cause.unwrap_or_else(|| "all attempted commands failed".to_string());
            return Ok(self.fail(FailureKind::ExecutionFailed, cause).await);
        }
        self.transition(Phase::Verifying).await?;
        Ok(self.phase)
    }

    /// `VERIFYING -> REPORTING`, whatever the verification says.
    pub async fn verify(&mut self) -> Result<Phase, ProtocolError> {
        self.expect("verify", Phase::Verifying)?;

        let capability = match self.capability(|c| c.verification.as_ref(), "verification") {
            Ok(capability) => capability,
            Err(e) => return Ok(self.fail_collaborator(&e).await),
        };
        let request = VerificationRequest::for_incident(&self.incident);
        let response: VerificationResponse = match self
            .call_with_retries(
                capability.as_ref(),
                OP_VERIFY,
                &request,
                self.shared.settings.timeouts.verification(),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(self.fail_collaborator(&e).await),
        };

        if let Err(e) = self
            .ctx
            .put(self.phase, ContextKey::Verification, &response)
            .await
        {
            return Ok(self.fail_store(&e).await);
        }
        info!(
            session_id = %self.incident.id,
            resolved = response.resolved,
            "Verification finished"
        );
        self.verification = Some(response);
        self.transition(Phase::Reporting).await?;
        Ok(self.phase)
    }

    /// `REPORTING -> COMPLETE`.
    pub async fn generate_report(&mut self) -> Result<Phase, ProtocolError> {
        self.expect("generate-report", Phase::Reporting)?;
        let (Some(diagnosis), Some(verification)) =
            (self.diagnosis.clone(), self.verification.clone())
        else {
            return Err(ProtocolError::OutOfOrder {
                operation: "generate-report",
                current: self.phase,
            });
        };
        let executions = self.executions.clone().unwrap_or_default();

        let capability = match self.capability(|c| c.report.as_ref(), "report") {
            Ok(capability) => capability,
            Err(e) => return Ok(self.fail_collaborator(&e).await),
        };

        let outcome = Outcome::from_results(&executions, verification.resolved);
        let (summary, rationale) = match &diagnosis {
            DiagnosisResponse::Plan {
                summary, rationale, ..
            } => (summary.clone(), rationale.clone()),
            DiagnosisResponse::CannotDiagnose { reason } => (reason.clone(), String::new()),
        };
        let request = ReportRequest {
            incident: &self.incident,
            diagnosis: &diagnosis,
            plan_rationale: &rationale,
            executions: &executions,
            verification: &verification,
            outcome,
        };
        let response: ReportResponse = match self
            .call_with_retries(
                capability.as_ref(),
                OP_REPORT,
                &request,
                self.shared.settings.timeouts.report(),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(self.fail_collaborator(&e).await),
        };

        let report = Report {
            incident_id: self.incident.id.clone(),
            alert_name: self.incident.alert_name.clone(),
            summary,
            diagnosis: rationale,
            commands_executed: executions.iter().map(ExecutedCommand::from).collect(),
            outcome,
            verification,
            content: response.content,
            generated_at: Utc::now(),
        };
        if let Err(e) = self.ctx.put(self.phase, ContextKey::Report, &report).await {
            return Ok(self.fail_store(&e).await);
        }
        self.report = Some(report);

        if let Err(e) = self
            .shared
            .registry
            .update(&self.incident.id, |s| s.outcome = Some(outcome))
            .await
        {
            warn!(session_id = %self.incident.id, error = %e, "Registry update failed");
        }
        self.transition(Phase::Complete).await?;
        info!(session_id = %self.incident.id, outcome = %outcome, "Session complete");
        Ok(self.phase)
    }

    fn expect(&self, operation: &'static str, required: Phase) -> Result<(), ProtocolError> {
        if self.phase == required {
            return Ok(());
        }
        warn!(
            session_id = %self.incident.id,
            operation,
            phase = %self.phase,
            "Rejected out-of-order session operation"
        );
        Err(ProtocolError::OutOfOrder {
            operation,
            current: self.phase,
        })
    }

    async fn transition(&mut self, to: Phase) -> Result<(), ProtocolError> {
        if !self.phase.can_transition_to(to) {
            return Err(ProtocolError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        info!(session_id = %self.incident.id, from = %self.phase, to = %to, "Phase transition");
        self.phase = to;
        if to != Phase::Failed {
            self.furthest = self.furthest.max(to);
        }
        if let Err(e) = self
            .shared
            .registry
            .update(&self.incident.id, |s| s.phase = to)
            .await
        {
            warn!(session_id = %self.incident.id, error = %e, "Registry update failed");
        }
        Ok(())
    }

    fn capability(
        &self,
        select: impl FnOnce(&Collaborators) -> Option<&Arc<dyn Capability>>,
        name: &str,
    ) -> Result<Arc<dyn Capability>, CollaboratorError> {
        select(&self.shared.collaborators)
            .cloned()
            .ok_or_else(|| CollaboratorError::Unavailable(format!("{name} collaborator")))
    }

    /// Invoke an idempotent, read-only operation with bounded retries.
    async fn call_with_retries<Req, Resp>(
        &self,
        capability: &dyn Capability,
        operation: &str,
        request: &Req,
        deadline: Duration,
    ) -> Result<Resp, CollaboratorError>
    where
        Req: serde::Serialize + Sync + ?Sized,
        Resp: serde::de::DeserializeOwned,
    {
        let settings = &self.shared.settings;
        let mut attempt = 0;
        loop {
            match call(capability, &self.incident.id, operation, request, deadline).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < settings.retries => {
                    attempt += 1;
                    warn!(
                        session_id = %self.incident.id,
                        operation,
                        attempt,
                        error = %e,
                        "Collaborator call failed, retrying"
                    );
                    tokio::time::sleep(settings.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fail_collaborator(&mut self, error: &CollaboratorError) -> Phase {
        self.fail(FailureKind::from(error), error.to_string()).await
    }

    async fn fail_store(&mut self, error: &StoreError) -> Phase {
        self.fail(FailureKind::from(error), error.to_string()).await
    }

    async fn fail(&mut self, kind: FailureKind, cause: impl Into<String>) -> Phase {
        let cause = cause.into();
        let failed_from = self.phase;
        if !failed_from.can_transition_to(Phase::Failed) {
            warn!(session_id = %self.incident.id, phase = %failed_from, "Cannot fail a terminal session");
            return self.phase;
        }

        let executed = self
            .executions
            .iter()
            .flatten()
            .map(|r| match r.result.error() {
                None => format!("{} [ok]", r.command_line),
                Some(e) => format!("{} [{}]", r.command_line, e.kind),
            })
            .collect();
        let summary = render_failure_summary(&FailureSummaryData {
            session_id: &self.incident.id,
            alert_name: &self.incident.alert_name,
            kind,
            failed_from,
            furthest_phase: self.furthest,
            cause: &cause,
            executed,
        });
        let record = FailureRecord {
            furthest_phase: self.furthest,
            failed_from,
            kind,
            cause,
            failed_at: Utc::now(),
            summary,
        };

        error!(
            session_id = %self.incident.id,
            phase = %failed_from,
            kind = %kind,
            "Session failed: {}",
            record.cause
        );

        // Checked above, cannot fail.
        let _ = self.transition(Phase::Failed).await;
        if let Err(e) = self
            .ctx
            .put(Phase::Failed, ContextKey::Failure, &record)
            .await
        {
            error!(session_id = %self.incident.id, error = %e, "Failed to persist failure record");
        }
        if let Err(e) = self
            .shared
            .registry
            .update(&self.incident.id, |s| s.failure_kind = Some(kind))
            .await
        {
            warn!(session_id = %self.incident.id, error = %e, "Registry update failed");
        }
        self.failure = Some(record);
        self.phase
    }
}
