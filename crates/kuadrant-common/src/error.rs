//! Error types for the Kuadrant policy compiler
//!
//! Errors are structured with fields so that a caller compiling many topology
//! paths can decide per error whether to skip the offending input or abort.
//! Invalid paths and validation problems are local to one path or policy;
//! serialization errors poison the whole compilation.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for policy compilation
#[derive(Debug, Error)]
pub enum Error {
    /// A topology path does not have the expected shape or ownership chain
    #[error("invalid path at {segment}: {message}")]
    InvalidPath {
        /// The failing segment (e.g. "listener", "httproute")
        segment: String,
        /// Description of the mismatch
        message: String,
    },

    /// A policy or resource spec is invalid
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The invalid field path (e.g. "spec.defaults")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error (e.g. a corrupt persisted config)
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The document kind being processed (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create an invalid path error for the given segment
    pub fn invalid_path(segment: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidPath {
            segment: segment.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error without a field path
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            field: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a specific field path
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with document kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Whether this error must abort the whole compilation
    ///
    /// Invalid paths and validation errors only affect the path or policy they
    /// were raised for; the caller skips it and carries on.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidPath { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => true,
        }
    }

    /// Get the failing path segment if this is an invalid path error
    pub fn segment(&self) -> Option<&str> {
        match self {
            Error::InvalidPath { segment, .. } => Some(segment),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a listener that belongs to another gateway is reported with the
    /// failing segment so the caller can skip just that path
    #[test]
    fn story_invalid_path_names_failing_segment() {
        let err = Error::invalid_path("listener", "listener not owned by gateway");
        assert!(err.to_string().contains("invalid path at listener"));
        assert_eq!(err.segment(), Some("listener"));
        assert!(!err.is_fatal());
    }

    /// Story: a corrupt persisted config stops the whole compilation
    #[test]
    fn story_serialization_errors_are_fatal() {
        let err = Error::serialization_for_kind("WasmConfig", "missing field `services`");
        match &err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("WasmConfig")),
            _ => panic!("Expected Serialization variant"),
        }
        assert!(err.is_fatal());
        assert_eq!(err.segment(), None);
    }

    #[test]
    fn test_validation_for_field() {
        let err = Error::validation_for_field(
            "spec.defaults",
            "defaults and overrides are mutually exclusive",
        );
        assert!(err.to_string().contains("spec.defaults"));
        assert!(!err.is_fatal());

        match Error::validation("any message") {
            Error::Validation { field, message } => {
                assert_eq!(field, UNKNOWN_CONTEXT);
                assert_eq!(message, "any message");
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { kind: None, .. }));
    }
}
