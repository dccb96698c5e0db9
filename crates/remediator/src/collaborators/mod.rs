//! Collaborating agents.
//!
//! Every collaborator, local or remote, sits behind the [`Capability`]
//! trait: a descriptor for discovery and a single `invoke` taking an
//! operation name plus JSON payload and returning a [`ToolResult`]
//! envelope. [`call`] layers typed requests, a deadline and response
//! decoding on top.

mod alertmanager;
mod http;
pub mod messages;

pub use alertmanager::AlertmanagerVerifier;
pub use http::HttpCapability;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::CollaboratorError;
use crate::tools::ToolResult;

/// Operation name: diagnose an incident and propose a plan.
pub const OP_DIAGNOSE: &str = "diagnose";
/// Operation name: check whether the triggering condition cleared.
pub const OP_VERIFY: &str = "verify";
/// Operation name: render the incident report.
pub const OP_REPORT: &str = "report";
/// Operation name: run a full remediation for an alert.
pub const OP_REMEDIATE_ALERT: &str = "remediate-alert";

/// Capability descriptor served at `/.well-known/agent.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub operations: Vec<OperationDescriptor>,
}

impl CapabilityDescriptor {
    /// Whether the descriptor lists `operation`.
    #[must_use]
    pub fn supports(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op.name == operation)
    }
}

/// One invocable operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Body of `POST /invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRequest {
    pub session_id: String,
    pub operation: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// An invocable collaborator.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Static description of the collaborator.
    fn descriptor(&self) -> CapabilityDescriptor;

    /// Perform one operation. `Err` means the call itself failed (transport,
    /// unparseable envelope); a collaborator-reported error is a
    /// `ToolResult::Failure`.
    async fn invoke(&self, request: CapabilityRequest) -> Result<ToolResult, CollaboratorError>;
}

/// Invoke `operation` with a typed request and decode the typed response.
pub async fn call<Req, Resp>(
    capability: &dyn Capability,
    session_id: &str,
    operation: &str,
    request: &Req,
    deadline: Duration,
) -> Result<Resp, CollaboratorError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let name = capability.descriptor().name;
    let payload =
        serde_json::to_value(request).map_err(|e| CollaboratorError::malformed(&name, e))?;
    let request = CapabilityRequest {
        session_id: session_id.to_string(),
        operation: operation.to_string(),
        payload,
    };

    debug!(session_id, capability = %name, operation, "Invoking collaborator");
    let envelope = match tokio::time::timeout(deadline, capability.invoke(request)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(CollaboratorError::Timeout {
                capability: name,
                after: deadline,
            })
        }
    };

    let value = envelope
        .into_result()
        .map_err(|error| CollaboratorError::Failed {
            capability: name.clone(),
            error,
        })?;
    serde_json::from_value(value).map_err(|e| CollaboratorError::malformed(&name, e))
}
