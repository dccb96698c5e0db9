//! Tool result envelope.
//!
//! Every cluster-facing operation (validation, execution, collaborator calls)
//! returns a [`ToolResult`]: either a success carrying data, or a failure
//! carrying a classified [`ToolError`]. The two cases are variants of one
//! enum, so the `success` flag and the populated field cannot disagree.
//!
//! On the wire the envelope is flattened to
//! `{"success": true, "data": ...}` / `{"success": false, "error": {...}}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::classifier;

/// Closed taxonomy of tool error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Resource absent
    NotFound,
    /// Authorization failure
    PermissionDenied,
    /// Deadline exceeded
    Timeout,
    /// Malformed or rejected request
    InvalidInput,
    /// Concurrent modification / resource-version mismatch
    Conflict,
    /// Unclassified
    Unknown,
}

impl ErrorKind {
    /// Stable kebab-case name, as used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid-input",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }

    /// Whether an operation failing with this kind may succeed if re-issued.
    ///
    /// Only meaningful for read operations; mutating commands are never
    /// retried regardless of this flag.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Conflict)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error information with recovery guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Classified kind
    pub kind: ErrorKind,
    /// Human readable description
    pub message: String,
    /// Original output the classification was made from
    #[serde(default)]
    pub raw: String,
    /// Recommended next action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Whether re-issuing the operation may help
    #[serde(default)]
    pub recoverable: bool,
}

impl ToolError {
    /// Create an error with the default suggestion for its kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw: String::new(),
            suggestion: Some(classifier::suggestion(kind, None, None)),
            recoverable: kind.is_transient(),
        }
    }

    /// Shorthand for an `invalid-input` error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Attach the raw output this error was derived from.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// Replace the suggested next action.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Tagged outcome of a cluster-facing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult<T = serde_json::Value> {
    /// Operation succeeded
    Success(T),
    /// Operation failed with a classified error
    Failure(ToolError),
}

impl<T> ToolResult<T> {
    /// Whether this is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    /// The error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ToolError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// The error kind, if this is a failure.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|e| e.kind)
    }

    /// Convert into a standard `Result`.
    ///
    /// # Errors
    /// Returns the contained [`ToolError`] for failures.
    pub fn into_result(self) -> Result<T, ToolError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, ToolError>> for ToolResult<T> {
    fn from(result: Result<T, ToolError>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(error) => Self::Failure(error),
        }
    }
}

impl<T: Serialize> ToolResult<T> {
    /// Erase the payload type into a JSON value.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn to_value_result(&self) -> Result<ToolResult, serde_json::Error> {
        Ok(match self {
            Self::Success(data) => ToolResult::Success(serde_json::to_value(data)?),
            Self::Failure(error) => ToolResult::Failure(error.clone()),
        })
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ToolError>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    error: Option<ToolError>,
}

impl<T: Serialize> Serialize for ToolResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let envelope = match self {
            Self::Success(data) => EnvelopeRef {
                success: true,
                data: Some(data),
                error: None,
            },
            Self::Failure(error) => EnvelopeRef {
                success: false,
                data: None,
                error: Some(error),
            },
        };
        envelope.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ToolResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::<T>::deserialize(deserializer)?;
        match (envelope.success, envelope.data, envelope.error) {
            (true, Some(data), None) => Ok(Self::Success(data)),
            (false, None, Some(error)) => Ok(Self::Failure(error)),
            (true, _, Some(_)) => Err(serde::de::Error::custom(
                "success envelope must not carry an error",
            )),
            (true, None, None) => Err(serde::de::Error::custom(
                "success envelope is missing data",
            )),
            (false, _, None) => Err(serde::de::Error::custom(
                "failure envelope is missing error",
            )),
            (false, Some(_), Some(_)) => Err(serde::de::Error::custom(
                "failure envelope must not carry data",
            )),
        }
    }
}
