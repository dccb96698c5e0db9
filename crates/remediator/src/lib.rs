//! Alert-driven remediation for Kubernetes workloads.
//!
//! A firing Alertmanager alert opens an incident session. The session asks a
//! diagnosis collaborator for a remediation plan, validates every proposed
//! `kubectl` command against an allowlist, executes the accepted plan,
//! verifies whether the alert cleared, and asks a report collaborator to
//! summarise what happened. Each phase's output is written once to a
//! per-session context store.
//!
//! # Usage
//!
//! ```no_run
//! use remediator::{build_orchestrator, config::RemediatorConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = RemediatorConfig::default();
//! let orchestrator = build_orchestrator(&config)?;
//! println!("{} active sessions", orchestrator.registry().active_count().await);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`alerts`] turns webhook deliveries into sessions, once per firing
//! - [`session`] holds the phase state machine and status registry
//! - [`tools`] validates and executes commands, with uniform results
//! - [`context`] is the write-once session context store
//! - [`collaborators`] talks to diagnosis, verification and report agents
//! - [`server`] exposes the HTTP surface

pub mod alerts;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod server;
pub mod session;
pub mod tools;

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::info;

use collaborators::{
    AlertmanagerVerifier, Capability, HttpCapability, OP_DIAGNOSE, OP_REPORT, OP_VERIFY,
};
use config::{RemediatorConfig, StoreBackend, VerificationMode};
use context::{ContextStore, FileContextStore, MemoryContextStore};
use session::{Collaborators, Orchestrator, SessionRegistry, SessionSettings};
use tools::{CommandExecutor, CommandValidator, KubectlRunner};

pub use alerts::{AlertIngestor, AlertmanagerAlert, AlertmanagerPayload};
pub use error::{CollaboratorError, ConfigError, ProtocolError, StoreError};
pub use session::{Incident, Phase, Session};
pub use tools::{ErrorKind, ToolError, ToolResult};

/// Build the context store selected by `config.store`.
pub fn build_store(config: &RemediatorConfig) -> Arc<dyn ContextStore> {
    match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryContextStore::new()),
        StoreBackend::File => Arc::new(FileContextStore::new(config.store.dir.clone())),
    }
}

/// Build the collaborator set from configured endpoints.
pub fn build_collaborators(config: &RemediatorConfig) -> Result<Collaborators> {
    let endpoints = &config.collaborators;

    let diagnosis = endpoints.diagnosis_url.as_ref().map(|url| {
        Arc::new(HttpCapability::new("diagnosis", url.clone(), &[OP_DIAGNOSE]))
            as Arc<dyn Capability>
    });
    let report = endpoints.report_url.as_ref().map(|url| {
        Arc::new(HttpCapability::new("report", url.clone(), &[OP_REPORT])) as Arc<dyn Capability>
    });
    let verification: Arc<dyn Capability> = match endpoints.verification {
        VerificationMode::Alertmanager => Arc::new(AlertmanagerVerifier::new(
            endpoints.alertmanager_url.clone(),
            endpoints.settle_delay(),
        )),
        VerificationMode::Http => {
            let url = endpoints
                .verification_url
                .clone()
                .context("verification is http but no verificationUrl is configured")?;
            Arc::new(HttpCapability::new("verification", url, &[OP_VERIFY]))
        }
    };

    Ok(Collaborators {
        diagnosis,
        verification: Some(verification),
        report,
    })
}

/// Wire an [`Orchestrator`] from configuration.
pub fn build_orchestrator(config: &RemediatorConfig) -> Result<Orchestrator> {
    config.validate().context("invalid configuration")?;

    let store = build_store(config);
    let runner = Arc::new(KubectlRunner::new(config.execution.kubectl_path.clone()));
    let executor = CommandExecutor::new(runner, config.timeouts.command());
    let validator = CommandValidator::new(&config.validator);
    let collaborators = build_collaborators(config)?;

    info!(
        store = ?config.store.backend,
        verification = ?config.collaborators.verification,
        diagnosis = collaborators.diagnosis.is_some(),
        report = collaborators.report.is_some(),
        "Orchestrator configured"
    );

    Ok(Orchestrator::new(
        store,
        SessionRegistry::new(),
        validator,
        executor,
        collaborators,
        SessionSettings::from_config(config),
    ))
}
