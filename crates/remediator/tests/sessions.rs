//! End-to-end session lifecycle tests against fake collaborators.

mod common;

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{incident, plan, report_content, resolved, FakeCapability, FakeRunner, Harness};
use remediator::config::ExecutionPolicy;
use remediator::context::ContextKey;
use remediator::session::{FailureKind, Outcome};
use remediator::tools::{ErrorKind, RunOutput, ToolError};
use remediator::{CollaboratorError, Phase, ProtocolError, StoreError, ToolResult};

fn set_resources_plan() -> serde_json::Value {
    plan(json!([{
        "verb": "set-resources",
        "target": "deployment/svc-b",
        "params": { "cpu": "500m" }
    }]))
}

fn happy_harness() -> Harness {
    Harness::new()
        .diagnosis(FakeCapability::replying("diagnosis", set_resources_plan()))
        .verification(FakeCapability::replying("verification", resolved(true)))
        .report(FakeCapability::replying("report", report_content()))
}

#[tokio::test]
async fn test_high_queue_depth_remediated_and_reported() {
    let harness = happy_harness();
    let orchestrator = harness.build();

    let session = orchestrator
        .remediate(incident("HighQueueDepth", &[("service", "svc-b")]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(
        harness.runner.calls(),
        vec![vec![
            "set".to_string(),
            "resources".to_string(),
            "deployment/svc-b".to_string(),
            "--limits=cpu=500m".to_string(),
            "-n".to_string(),
            "default".to_string(),
        ]]
    );

    let report = session.report().unwrap();
    assert_eq!(report.outcome, Outcome::Resolved);
    assert_eq!(report.alert_name, "HighQueueDepth");
    assert_eq!(report.commands_executed.len(), 1);
    assert!(report.commands_executed[0].success);
    assert!(report.content.starts_with("# Incident report"));

    let keys = harness.store.keys(session.id()).await.unwrap();
    assert_eq!(
        keys,
        vec![
            ContextKey::Incident,
            ContextKey::Diagnosis,
            ContextKey::PlanValidation,
            ContextKey::RemediationPlan,
            ContextKey::ExecutionResults,
            ContextKey::Verification,
            ContextKey::Report,
        ]
    );

    let summary = orchestrator.registry().get(session.id()).await.unwrap();
    assert_eq!(summary.phase, Phase::Complete);
    assert_eq!(summary.outcome, Some(Outcome::Resolved));
    assert_eq!(orchestrator.registry().active_count().await, 0);
}

#[tokio::test]
async fn test_delete_namespace_rejected_before_execution() {
    let verification = FakeCapability::replying("verification", resolved(true));
    let harness = Harness::new()
        .diagnosis(FakeCapability::replying(
            "diagnosis",
            plan(json!([{ "verb": "delete", "target": "namespace/prod" }])),
        ))
        .verification(verification.clone());
    let orchestrator = harness.build();

    let session = orchestrator
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Failed);
    let failure = session.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::UnsafePlan);
    assert_eq!(failure.failed_from, Phase::PlanValidating);
    assert!(failure.cause.contains("#0"));
    assert!(failure.summary.contains("unsafe-plan"));
    let summary = orchestrator.registry().get(session.id()).await.unwrap();
    assert_eq!(summary.failure_kind, Some(FailureKind::UnsafePlan));

    assert!(harness.runner.calls().is_empty());
    assert!(session.executions().is_empty());
    assert_eq!(verification.calls(), 0);
    assert!(matches!(
        harness
            .store
            .get(session.id(), ContextKey::ExecutionResults)
            .await,
        Err(StoreError::NotFound { .. })
    ));

    let validation = harness
        .store
        .get(session.id(), ContextKey::PlanValidation)
        .await
        .unwrap();
    assert_eq!(validation.value["accepted"], json!(false));
    assert_eq!(
        validation.value["verdicts"][0]["result"]["error"]["kind"],
        json!("invalid-input")
    );
}

#[tokio::test]
async fn test_one_bad_command_rejects_whole_plan() {
    let harness = Harness::new()
        .diagnosis(FakeCapability::replying(
            "diagnosis",
            plan(json!([
                { "verb": "scale", "target": "deployment/web", "params": { "replicas": "3" } },
                { "verb": "scale", "target": "deployment/web; rm -rf /", "params": { "replicas": "3" } }
            ])),
        ))
        .verification(FakeCapability::replying("verification", resolved(true)));

    let session = harness
        .build()
        .remediate(incident("HighLatency", &[]))
        .await
        .unwrap();

    assert_eq!(session.failure().unwrap().kind, FailureKind::UnsafePlan);
    assert!(harness.runner.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_command_timeout_fails_execution() {
    let verification = FakeCapability::replying("verification", resolved(true));
    let harness = Harness::new()
        .diagnosis(FakeCapability::replying("diagnosis", set_resources_plan()))
        .verification(verification.clone())
        .runner(FakeRunner::hanging(Duration::from_secs(600)));

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[("service", "svc-b")]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Failed);
    let failure = session.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::ExecutionFailed);
    assert_eq!(failure.failed_from, Phase::Executing);

    assert_eq!(session.executions().len(), 1);
    assert_eq!(
        session.executions()[0].result.error_kind(),
        Some(ErrorKind::Timeout)
    );
    assert_eq!(verification.calls(), 0);

    let stored = harness
        .store
        .get(session.id(), ContextKey::ExecutionResults)
        .await
        .unwrap();
    assert_eq!(stored.value[0]["result"]["error"]["kind"], json!("timeout"));
}

#[tokio::test]
async fn test_continue_policy_records_every_command() {
    let harness = Harness::new()
        .diagnosis(FakeCapability::replying(
            "diagnosis",
            plan(json!([
                { "verb": "rollout-restart", "target": "deployment/missing" },
                { "verb": "scale", "target": "deployment/web", "params": { "replicas": "4" } }
            ])),
        ))
        .verification(FakeCapability::replying("verification", resolved(true)))
        .report(FakeCapability::replying("report", report_content()))
        .runner(FakeRunner::scripted(vec![
            RunOutput::failure(
                1,
                "Error from server (NotFound): deployments.apps \"missing\" not found",
            ),
            RunOutput::success("deployment.apps/web scaled"),
        ]));

    let session = harness
        .build()
        .remediate(incident("HighLatency", &[]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Complete);
    let executions = session.executions();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].index, 0);
    assert_eq!(executions[0].result.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(executions[1].index, 1);
    assert!(executions[1].succeeded());
    assert_eq!(
        session.report().unwrap().outcome,
        Outcome::PartiallyRemediated
    );
}

#[tokio::test]
async fn test_abort_policy_stops_after_first_failure() {
    let harness = Harness::new()
        .diagnosis(FakeCapability::replying(
            "diagnosis",
            plan(json!([
                { "verb": "rollout-restart", "target": "deployment/web" },
                { "verb": "scale", "target": "deployment/web", "params": { "replicas": "4" } }
            ])),
        ))
        .verification(FakeCapability::replying("verification", resolved(true)))
        .runner(FakeRunner::scripted(vec![RunOutput::failure(
            1,
            "Error from server (Forbidden): deployments.apps \"web\" is forbidden",
        )]))
        .policy(ExecutionPolicy::Abort);

    let session = harness
        .build()
        .remediate(incident("HighLatency", &[]))
        .await
        .unwrap();

    assert_eq!(harness.runner.calls().len(), 1);
    assert_eq!(session.executions().len(), 1);
    assert_eq!(
        session.executions()[0].result.error_kind(),
        Some(ErrorKind::PermissionDenied)
    );
    assert_eq!(session.failure().unwrap().kind, FailureKind::ExecutionFailed);
}

#[tokio::test]
async fn test_unresolved_alert_still_completes() {
    let harness = happy_harness()
        .verification(FakeCapability::replying("verification", resolved(false)));

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.report().unwrap().outcome, Outcome::NotResolved);
}

#[tokio::test]
async fn test_cannot_diagnose_is_incomplete() {
    let harness = Harness::new().diagnosis(FakeCapability::replying(
        "diagnosis",
        json!({ "outcome": "cannot-diagnose", "reason": "no metrics for service" }),
    ));

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    let failure = session.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::DiagnosisIncomplete);
    assert!(failure.cause.contains("no metrics for service"));
    assert!(harness
        .store
        .get(session.id(), ContextKey::Diagnosis)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_empty_plan_is_incomplete() {
    let harness = Harness::new().diagnosis(FakeCapability::replying("diagnosis", plan(json!([]))));

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(
        session.failure().unwrap().kind,
        FailureKind::DiagnosisIncomplete
    );
}

#[tokio::test(start_paused = true)]
async fn test_diagnosis_timeout_preserves_furthest_phase() {
    let diagnosis =
        FakeCapability::slow("diagnosis", Duration::from_secs(600), set_resources_plan());
    let harness = Harness::new().diagnosis(diagnosis.clone());

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(diagnosis.calls(), 1);

    let stored = harness
        .store
        .get(session.id(), ContextKey::Failure)
        .await
        .unwrap();
    assert_eq!(stored.written_by, Phase::Failed);
    assert_eq!(stored.value["kind"], json!("collaborator-timeout"));
    assert_eq!(stored.value["furthestPhase"], json!("DIAGNOSING"));
    assert_eq!(stored.value["failedFrom"], json!("DIAGNOSING"));
}

#[tokio::test]
async fn test_malformed_diagnosis_response() {
    let harness = Harness::new().diagnosis(FakeCapability::replying(
        "diagnosis",
        json!({ "unexpected": true }),
    ));

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(
        session.failure().unwrap().kind,
        FailureKind::MalformedResponse
    );
}

#[tokio::test]
async fn test_diagnosis_failure_is_not_retried() {
    let diagnosis = FakeCapability::new("diagnosis", |_| {
        Ok(ToolResult::Failure(
            ToolError::new(ErrorKind::Timeout, "model overloaded").with_suggestion("retry later"),
        ))
    });
    let harness = Harness::new().diagnosis(diagnosis.clone());

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(diagnosis.calls(), 1);
    assert_eq!(
        session.failure().unwrap().kind,
        FailureKind::CollaboratorError
    );
}

#[tokio::test]
async fn test_verification_transport_errors_are_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let verification = FakeCapability::new("verification", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(CollaboratorError::Transport {
                capability: "verification".to_string(),
                message: "connection reset".to_string(),
            })
        } else {
            Ok(ToolResult::Success(resolved(true)))
        }
    });
    let harness = happy_harness().verification(verification.clone());

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(verification.calls(), 3);
}

#[tokio::test]
async fn test_verification_gives_up_after_retries() {
    let verification = FakeCapability::new("verification", |_| {
        Err(CollaboratorError::Transport {
            capability: "verification".to_string(),
            message: "connection refused".to_string(),
        })
    });
    let harness = happy_harness().verification(verification.clone());

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    assert_eq!(verification.calls(), 3);
    let failure = session.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::CollaboratorUnavailable);
    assert_eq!(failure.furthest_phase, Phase::Verifying);
    assert_eq!(session.executions().len(), 1);
}

#[tokio::test]
async fn test_missing_report_collaborator() {
    let harness = Harness::new()
        .diagnosis(FakeCapability::replying("diagnosis", set_resources_plan()))
        .verification(FakeCapability::replying("verification", resolved(true)));

    let session = harness
        .build()
        .remediate(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    let failure = session.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::CollaboratorUnavailable);
    assert_eq!(failure.failed_from, Phase::Reporting);
    assert_eq!(failure.furthest_phase, Phase::Reporting);
    assert!(failure.summary.contains("kubectl set resources deployment/svc-b"));
}

#[tokio::test]
async fn test_out_of_order_invocation_does_not_mutate() {
    let diagnosis = FakeCapability::replying("diagnosis", set_resources_plan());
    let harness = happy_harness().diagnosis(diagnosis.clone());
    let orchestrator = harness.build();
    let mut session = orchestrator
        .open(incident("HighQueueDepth", &[]))
        .await
        .unwrap();

    let err = session.execute().await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::OutOfOrder {
            operation: "execute",
            current: Phase::Received
        }
    ));
    assert_eq!(session.phase(), Phase::Received);
    assert!(harness.runner.calls().is_empty());

    assert_eq!(session.diagnose().await.unwrap(), Phase::PlanValidating);
    assert!(session.diagnose().await.is_err());
    assert_eq!(diagnosis.calls(), 1);

    assert_eq!(session.drive().await, Phase::Complete);
    assert!(session.validate_plan().await.is_err());
    assert!(session.execute().await.is_err());
    assert!(session.generate_report().await.is_err());
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(harness.runner.calls().len(), 1);
}

#[tokio::test]
async fn test_same_incident_cannot_open_twice() {
    let orchestrator = happy_harness().build();
    let incident = incident("HighQueueDepth", &[]);

    orchestrator.open(incident.clone()).await.unwrap();
    assert!(matches!(
        orchestrator.open(incident).await,
        Err(ProtocolError::DuplicateSession(_))
    ));
    assert_eq!(orchestrator.registry().list().await.len(), 1);
}
