//! Shared, per-session context store.
//!
//! Each session gets its own namespace of typed keys. Every key is
//! write-once: the first `put` wins and later writes fail with
//! [`StoreError::AlreadyWritten`]. A key may only be written by the phase
//! that produces it, enforced by [`SessionContext`].

mod file;
mod memory;

pub use file::FileContextStore;
pub use memory::MemoryContextStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreError;
use crate::session::Phase;

/// Schema version stamped on every entry.
pub const SCHEMA_VERSION: u32 = 1;

/// Closed vocabulary of context keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextKey {
    Incident,
    Diagnosis,
    PlanValidation,
    RemediationPlan,
    ExecutionResults,
    Verification,
    Report,
    Failure,
}

impl ContextKey {
    pub const ALL: [ContextKey; 8] = [
        Self::Incident,
        Self::Diagnosis,
        Self::PlanValidation,
        Self::RemediationPlan,
        Self::ExecutionResults,
        Self::Verification,
        Self::Report,
        Self::Failure,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::Diagnosis => "diagnosis",
            Self::PlanValidation => "plan-validation",
            Self::RemediationPlan => "remediation-plan",
            Self::ExecutionResults => "execution-results",
            Self::Verification => "verification",
            Self::Report => "report",
            Self::Failure => "failure",
        }
    }

    /// The only phase allowed to write this key.
    #[must_use]
    pub fn producer(self) -> Phase {
        match self {
            Self::Incident => Phase::Received,
            Self::Diagnosis => Phase::Diagnosing,
            Self::PlanValidation | Self::RemediationPlan => Phase::PlanValidating,
            Self::ExecutionResults => Phase::Executing,
            Self::Verification => Phase::Verifying,
            Self::Report => Phase::Reporting,
            Self::Failure => Phase::Failed,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown context key '{s}'"))
    }
}

/// A stored value with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub version: u32,
    pub key: ContextKey,
    pub value: serde_json::Value,
    pub written_at: DateTime<Utc>,
    pub written_by: Phase,
}

impl ContextEntry {
    #[must_use]
    pub fn new(key: ContextKey, value: serde_json::Value, written_by: Phase) -> Self {
        Self {
            version: SCHEMA_VERSION,
            key,
            value,
            written_at: Utc::now(),
            written_by,
        }
    }
}

/// Storage backend for session context.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Store an entry. Fails with `AlreadyWritten` if the key is present.
    async fn put(&self, session_id: &str, entry: ContextEntry) -> Result<(), StoreError>;

    /// Fetch an entry. Fails with `NotFound` if absent.
    async fn get(&self, session_id: &str, key: ContextKey) -> Result<ContextEntry, StoreError>;

    /// Keys written for a session, in vocabulary order.
    async fn keys(&self, session_id: &str) -> Result<Vec<ContextKey>, StoreError>;

    /// Every session with at least one entry.
    async fn sessions(&self) -> Result<Vec<String>, StoreError>;
}

/// Phase-checked view of one session's context.
#[derive(Clone)]
pub struct SessionContext {
    session_id: String,
    store: Arc<dyn ContextStore>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, store: Arc<dyn ContextStore>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Write `key` on behalf of `current`, which must be its producer phase.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        current: Phase,
        key: ContextKey,
        value: &T,
    ) -> Result<(), StoreError> {
        let producer = key.producer();
        if producer != current {
            return Err(StoreError::WrongPhase {
                key,
                producer,
                current,
            });
        }
        let value = serde_json::to_value(value)?;
        self.store
            .put(&self.session_id, ContextEntry::new(key, value, current))
            .await?;
        debug!(session_id = %self.session_id, key = %key, "Context entry written");
        Ok(())
    }

    /// Read and decode `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: ContextKey) -> Result<T, StoreError> {
        let entry = self.store.get(&self.session_id, key).await?;
        Ok(serde_json::from_value(entry.value)?)
    }

    /// Read the raw entry.
    pub async fn entry(&self, key: ContextKey) -> Result<ContextEntry, StoreError> {
        self.store.get(&self.session_id, key).await
    }

    /// Keys written so far.
    pub async fn keys(&self) -> Result<Vec<ContextKey>, StoreError> {
        self.store.keys(&self.session_id).await
    }
}
