// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for dnslb object handling
#[derive(Error, Debug, Diagnostic)]
pub enum DnslbError {
    /// A required object field is absent
    #[error("{kind} is missing required field: {field}")]
    #[diagnostic(
        code(dnslb::missing_field),
        help("Objects delivered by the platform always carry metadata.name; check the API server response")
    )]
    MissingField {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        field: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(dnslb::serialization_error),
        help("Ensure the platform returned a valid core/v1 object as JSON")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid kind
    #[error("Unknown resource kind: {kind}")]
    #[diagnostic(
        code(dnslb::invalid_kind),
        help("Supported kinds: Service, Pod, Node")
    )]
    InvalidKind {
        #[allow(unused)]
        kind: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(dnslb::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for dnslb core operations
pub type Result<T> = std::result::Result<T, DnslbError>;

impl DnslbError {
    /// Create a MissingField error
    pub fn missing_field(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            kind: kind.into(),
            field: field.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    /// Create an InvalidKind error
    pub fn invalid_kind(kind: impl Into<String>) -> Self {
        Self::InvalidKind { kind: kind.into() }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
