//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use remediator::collaborators::{
    Capability, CapabilityDescriptor, CapabilityRequest, OperationDescriptor,
};
use remediator::config::{ExecutionPolicy, TimeoutConfig, ValidatorConfig};
use remediator::context::{ContextStore, MemoryContextStore};
use remediator::session::{Collaborators, Orchestrator, SessionRegistry, SessionSettings};
use remediator::tools::{CommandExecutor, CommandRunner, CommandValidator, RunOutput};
use remediator::{CollaboratorError, Incident, ToolResult};

type Responder = dyn Fn(&CapabilityRequest) -> Result<ToolResult, CollaboratorError> + Send + Sync;

/// Capability answering every call through a closure.
pub struct FakeCapability {
    name: String,
    delay: Option<Duration>,
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CapabilityRequest>>,
}

impl FakeCapability {
    pub fn new(
        name: &str,
        responder: impl Fn(&CapabilityRequest) -> Result<ToolResult, CollaboratorError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay: None,
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always succeed with `value`.
    pub fn replying(name: &str, value: Value) -> Arc<Self> {
        Self::new(name, move |_| Ok(ToolResult::Success(value.clone())))
    }

    /// Sleep for `delay` before answering with `value`.
    pub fn slow(name: &str, delay: Duration, value: Value) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay: Some(delay),
            responder: Box::new(move |_| Ok(ToolResult::Success(value.clone()))),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CapabilityRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Capability for FakeCapability {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name.clone(),
            version: "test".to_string(),
            description: String::new(),
            operations: vec![OperationDescriptor::new("any", "")],
        }
    }

    async fn invoke(&self, request: CapabilityRequest) -> Result<ToolResult, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

/// Runner replaying scripted outputs; succeeds once the script runs out.
#[derive(Default)]
pub struct FakeRunner {
    outputs: Mutex<VecDeque<RunOutput>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(outputs: Vec<RunOutput>) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.into()),
            ..Self::default()
        })
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, args: Vec<String>) -> std::io::Result<RunOutput> {
        self.calls.lock().unwrap().push(args);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.outputs.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| RunOutput::success("ok")))
    }
}

/// Orchestrator wiring with in-memory storage and fakes.
pub struct Harness {
    pub store: Arc<dyn ContextStore>,
    pub runner: Arc<FakeRunner>,
    pub collaborators: Collaborators,
    pub validator: ValidatorConfig,
    pub settings: SessionSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryContextStore::new()),
            runner: FakeRunner::succeeding(),
            collaborators: Collaborators::default(),
            validator: ValidatorConfig::default(),
            settings: SessionSettings {
                timeouts: TimeoutConfig {
                    command_secs: 5,
                    diagnosis_secs: 5,
                    verification_secs: 5,
                    report_secs: 5,
                },
                policy: ExecutionPolicy::Continue,
                retries: 2,
                retry_backoff: Duration::ZERO,
            },
        }
    }

    pub fn diagnosis(mut self, capability: Arc<dyn Capability>) -> Self {
        self.collaborators.diagnosis = Some(capability);
        self
    }

    pub fn verification(mut self, capability: Arc<dyn Capability>) -> Self {
        self.collaborators.verification = Some(capability);
        self
    }

    pub fn report(mut self, capability: Arc<dyn Capability>) -> Self {
        self.collaborators.report = Some(capability);
        self
    }

    pub fn runner(mut self, runner: Arc<FakeRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn policy(mut self, policy: ExecutionPolicy) -> Self {
        self.settings.policy = policy;
        self
    }

    pub fn build(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.store),
            SessionRegistry::new(),
            CommandValidator::new(&self.validator),
            CommandExecutor::new(
                Arc::clone(&self.runner) as Arc<dyn CommandRunner>,
                self.settings.timeouts.command(),
            ),
            self.collaborators.clone(),
            self.settings.clone(),
        )
    }
}

pub fn starts_at() -> DateTime<Utc> {
    "2026-03-01T10:00:00Z".parse().unwrap()
}

pub fn incident(alert_name: &str, labels: &[(&str, &str)]) -> Incident {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Incident::new(
        alert_name,
        format!("fp-{alert_name}"),
        labels,
        BTreeMap::new(),
        starts_at(),
        "default",
    )
}

/// Diagnosis payload proposing `commands`.
pub fn plan(commands: Value) -> Value {
    json!({
        "outcome": "plan",
        "summary": "queue consumer starved of CPU",
        "rationale": "raising the CPU limit lets the consumer drain the queue",
        "commands": commands,
    })
}

pub fn resolved(resolved: bool) -> Value {
    json!({ "resolved": resolved, "details": { "source": "test" } })
}

pub fn report_content() -> Value {
    json!({ "content": "# Incident report\n\nRemediated." })
}
