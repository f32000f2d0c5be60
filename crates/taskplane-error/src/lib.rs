//! Unified error taxonomy with stable error codes for taskplane.
//!
//! Every engine-level failure maps to an [`ErrorCode`] (a machine-readable,
//! stable string tag) grouped into an [`ErrorCategory`].  The
//! [`ClassifiedError`] carrier pairs a code with a human-readable message and
//! arbitrary key-value context, so host applications can branch on codes
//! while still logging something a person can read.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Manifest ingestion and normalization errors.
    Manifest,
    /// Task registry errors (duplicates, lookups).
    Registry,
    /// Dependency resolution and plan construction errors.
    Planning,
    /// Lifecycle hook execution errors.
    Hook,
    /// Task processor execution errors.
    Processor,
    /// State persistence errors.
    State,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manifest => "manifest",
            Self::Registry => "registry",
            Self::Planning => "planning",
            Self::Hook => "hook",
            Self::Processor => "processor",
            Self::State => "state",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Manifest --
    /// Manifest document is missing required fields or has the wrong shape.
    ManifestInvalid,

    // -- Registry --
    /// A task with the same id was already added.
    TaskDuplicate,
    /// Requested task id does not exist in the registry.
    TaskNotFound,
    /// No processor is registered for a task's kind and version.
    ProcessorNotFound,

    // -- Planning --
    /// A named dependency resolved to zero registered tasks.
    DependencyNotFound,
    /// A dependency exists but does not qualify under the current scope.
    DependencyOutOfScope,
    /// The dependency graph contains a cycle.
    DependencyCycle,

    // -- Hook --
    /// A lifecycle hook's handler returned an error.
    HookFailed,

    // -- Processor --
    /// A task processor returned an error.
    ProcessorFailed,

    // -- State --
    /// The state persistence backend failed to load or flush.
    StatePersistFailed,

    // -- Internal --
    /// Unexpected internal error.
    Internal,
}

impl ErrorCode {
    /// Returns the [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ManifestInvalid => ErrorCategory::Manifest,
            Self::TaskDuplicate | Self::TaskNotFound | Self::ProcessorNotFound => {
                ErrorCategory::Registry
            }
            Self::DependencyNotFound | Self::DependencyOutOfScope | Self::DependencyCycle => {
                ErrorCategory::Planning
            }
            Self::HookFailed => ErrorCategory::Hook,
            Self::ProcessorFailed => ErrorCategory::Processor,
            Self::StatePersistFailed => ErrorCategory::State,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the stable string form of this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestInvalid => "MANIFEST_INVALID",
            Self::TaskDuplicate => "TASK_DUPLICATE",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::ProcessorNotFound => "PROCESSOR_NOT_FOUND",
            Self::DependencyNotFound => "DEPENDENCY_NOT_FOUND",
            Self::DependencyOutOfScope => "DEPENDENCY_OUT_OF_SCOPE",
            Self::DependencyCycle => "DEPENDENCY_CYCLE",
            Self::HookFailed => "HOOK_FAILED",
            Self::ProcessorFailed => "PROCESSOR_FAILED",
            Self::StatePersistFailed => "STATE_PERSIST_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClassifiedError
// ---------------------------------------------------------------------------

/// An error with a stable code, a human-readable message, and key-value
/// context for structured logging or API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary key-value context (task ids, commands, stage codes, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ClassifiedError {
    /// Create a new classified error with an empty context.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry, returning the updated error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Returns the category of this error's code.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_to_stable_strings() {
        let json = serde_json::to_string(&ErrorCode::DependencyNotFound).unwrap();
        assert_eq!(json, "\"DEPENDENCY_NOT_FOUND\"");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::DependencyNotFound);
    }

    #[test]
    fn as_str_matches_serde_form() {
        for code in [
            ErrorCode::ManifestInvalid,
            ErrorCode::TaskDuplicate,
            ErrorCode::TaskNotFound,
            ErrorCode::ProcessorNotFound,
            ErrorCode::DependencyNotFound,
            ErrorCode::DependencyOutOfScope,
            ErrorCode::DependencyCycle,
            ErrorCode::HookFailed,
            ErrorCode::ProcessorFailed,
            ErrorCode::StatePersistFailed,
            ErrorCode::Internal,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::String(code.as_str().to_string()));
        }
    }

    #[test]
    fn classified_error_carries_context() {
        let err = ClassifiedError::new(ErrorCode::TaskDuplicate, "task already added")
            .with_context("task_id", "t1");
        assert_eq!(err.category(), ErrorCategory::Registry);
        assert_eq!(err.context.get("task_id"), Some(&serde_json::json!("t1")));
        assert_eq!(err.to_string(), "[TASK_DUPLICATE] task already added");
    }
}
