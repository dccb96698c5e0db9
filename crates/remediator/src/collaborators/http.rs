//! Remote collaborator reached over HTTP.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Capability, CapabilityDescriptor, CapabilityRequest, OperationDescriptor};
use crate::error::CollaboratorError;
use crate::tools::ToolResult;

/// A remote agent exposing `GET /.well-known/agent.json` and `POST /invoke`.
#[derive(Debug, Clone)]
pub struct HttpCapability {
    name: String,
    base_url: String,
    operations: Vec<String>,
    client: reqwest::Client,
}

impl HttpCapability {
    /// Create a client for the agent at `base_url`.
    ///
    /// `operations` is what the orchestrator expects to call; it only
    /// feeds the local descriptor.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, operations: &[&str]) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            operations: operations.iter().map(|op| (*op).to_string()).collect(),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the agent's own capability descriptor.
    pub async fn discover(&self) -> Result<CapabilityDescriptor, CollaboratorError> {
        let url = format!("{}/.well-known/agent.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport(&e))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Transport {
                capability: self.name.clone(),
                message: format!("discovery returned status {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed(&self.name, e))
    }

    fn transport(&self, error: &reqwest::Error) -> CollaboratorError {
        CollaboratorError::Transport {
            capability: self.name.clone(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Capability for HttpCapability {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name.clone(),
            version: String::new(),
            description: format!("remote agent at {}", self.base_url),
            operations: self
                .operations
                .iter()
                .map(|op| OperationDescriptor::new(op.clone(), ""))
                .collect(),
        }
    }

    async fn invoke(&self, request: CapabilityRequest) -> Result<ToolResult, CollaboratorError> {
        let url = format!("{}/invoke", self.base_url);
        debug!(
            session_id = %request.session_id,
            operation = %request.operation,
            url = %url,
            "POST collaborator invoke"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport(&e))?;

        // A well-formed envelope is authoritative even on an error status.
        if let Ok(envelope) = serde_json::from_str::<ToolResult>(&body) {
            return Ok(envelope);
        }

        if status.is_success() {
            warn!(capability = %self.name, "Collaborator returned an invalid envelope");
            Err(CollaboratorError::malformed(
                &self.name,
                format!("response is not a tool result envelope: {}", truncate(&body)),
            ))
        } else {
            Err(CollaboratorError::Transport {
                capability: self.name.clone(),
                message: format!("status {status}: {}", truncate(&body)),
            })
        }
    }
}

fn truncate(body: &str) -> &str {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
