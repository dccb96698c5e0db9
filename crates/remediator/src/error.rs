//! Error types for the remediator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::context::ContextKey;
use crate::session::Phase;
use crate::tools::ToolError;

/// Errors raised by a context store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key already holds a value for this session
    #[error("context key '{key}' already written for session {session_id}")]
    AlreadyWritten { session_id: String, key: ContextKey },

    /// Key has no value for this session
    #[error("context key '{key}' not found for session {session_id}")]
    NotFound { session_id: String, key: ContextKey },

    /// Key written while the session is outside the key's producer phase
    #[error("context key '{key}' may only be written in phase {producer}, session is in {current}")]
    WrongPhase {
        key: ContextKey,
        producer: Phase,
        current: Phase,
    },

    /// Session id is not usable as a storage namespace
    #[error("invalid session id '{0}'")]
    InvalidSessionId(String),

    /// Filesystem failure
    #[error("store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Protocol-level violations. None of these mutate session state.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Phase operation invoked in the wrong phase
    #[error("operation '{operation}' not allowed in phase {current}")]
    OutOfOrder {
        operation: &'static str,
        current: Phase,
    },

    /// Transition not in the state machine
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    /// Session already exists
    #[error("session {0} already exists")]
    DuplicateSession(String),

    /// Session does not exist
    #[error("session {0} not found")]
    UnknownSession(String),

    /// Context write rejected
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while invoking a collaborator capability.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// No response within the deadline
    #[error("{capability} timed out after {}s", after.as_secs())]
    Timeout {
        capability: String,
        after: Duration,
    },

    /// Response did not match the expected schema
    #[error("{capability} returned a malformed response: {reason}")]
    Malformed { capability: String, reason: String },

    /// Transport failure
    #[error("{capability} unreachable: {message}")]
    Transport { capability: String, message: String },

    /// Collaborator is not configured
    #[error("{0} is not configured")]
    Unavailable(String),

    /// Collaborator reported a classified error
    #[error("{capability} failed: {error}")]
    Failed {
        capability: String,
        error: ToolError,
    },
}

impl CollaboratorError {
    /// Create a malformed-response error.
    pub fn malformed(capability: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            capability: capability.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a read-only call failing this way may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Failed { error, .. } => error.recoverable,
            Self::Malformed { .. } | Self::Unavailable(_) => false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the schema
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Config values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
